//! JSON statement parameters to Bolt values.

use crate::error::Neo4jDriverError;
use loadgen_core::Params;
use neo4rs::{BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType};
use serde_json::Value;
use std::collections::HashMap;

/// Convert one JSON value to its Bolt equivalent.
///
/// Integers that fit in `i64` become Bolt integers, every other number a
/// Bolt float. Objects become maps.
pub fn json_to_bolt(name: &str, value: &Value) -> Result<BoltType, Neo4jDriverError> {
    match value {
        Value::Null => Ok(BoltType::Null(BoltNull)),
        Value::Bool(b) => Ok(BoltType::Boolean(BoltBoolean::new(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(BoltType::Integer(BoltInteger::new(i)))
            } else if let Some(f) = n.as_f64() {
                Ok(BoltType::Float(BoltFloat::new(f)))
            } else {
                Err(Neo4jDriverError::Param {
                    name: name.to_string(),
                    message: format!("number {n} is out of range"),
                })
            }
        }
        Value::String(s) => Ok(BoltType::String(BoltString::from(s.as_str()))),
        Value::Array(items) => {
            let value = items
                .iter()
                .map(|item| json_to_bolt(name, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(BoltType::List(BoltList { value }))
        }
        Value::Object(fields) => {
            let mut value = HashMap::with_capacity(fields.len());
            for (key, field) in fields {
                value.insert(BoltString::from(key.as_str()), json_to_bolt(name, field)?);
            }
            Ok(BoltType::Map(BoltMap { value }))
        }
    }
}

/// Build a neo4rs query with every parameter attached.
pub fn build_query(statement: &str, params: &Params) -> Result<neo4rs::Query, Neo4jDriverError> {
    let mut query = neo4rs::query(statement);
    for (name, value) in params {
        query = query.param(name, json_to_bolt(name, value)?);
    }
    Ok(query)
}
