use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::domain::models::Reading;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("home screen payload has unexpected shape: {0}")]
    UnexpectedResponse(&'static str),
    #[error("{field} is not a valid integer")]
    InvalidInteger { field: &'static str },
    #[error("unexpected {field} value {value:?}")]
    UnexpectedField { field: &'static str, value: String },
}

/// Parses the raw live-status body into a [`Reading`].
///
/// The payload is `{"home_screen": [{k: v}, ...]}`: an ordered list of
/// single-key objects that gets merged front to back into one flat map
/// (later keys overwrite earlier ones). A device status other than
/// "Online" is a valid state and yields the offline sentinel reading.
pub fn parse_home_screen(body: &str) -> Result<Reading, ParseError> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|_| ParseError::UnexpectedResponse("body is not valid JSON"))?;

    let entries = payload
        .get("home_screen")
        .and_then(Value::as_array)
        .ok_or(ParseError::UnexpectedResponse("missing home_screen array"))?;

    let mut items: HashMap<&str, &str> = HashMap::new();
    for entry in entries {
        let object = entry.as_object().ok_or(ParseError::UnexpectedResponse(
            "home_screen element is not an object",
        ))?;
        for (key, value) in object {
            let text = value.as_str().ok_or(ParseError::UnexpectedResponse(
                "home_screen value is not a string",
            ))?;
            items.insert(key.as_str(), text);
        }
    }

    if items.get("status").copied() != Some("Online") {
        return Ok(Reading::offline());
    }

    Ok(Reading {
        air: parse_temp(&items, "air_temp")?,
        pool: parse_temp(&items, "pool_temp")?,
        heater: heater_set_point(&items)?,
    })
}

// "1" means heating, "3" means on but not heating; the spa takes
// precedence over the pool while both report heating.
fn heater_set_point(items: &HashMap<&str, &str>) -> Result<i64, ParseError> {
    let spa = items.get("spa_heater").copied().unwrap_or("");
    let pool = items.get("pool_heater").copied().unwrap_or("");

    if spa == "1" {
        return parse_set_point(items, "spa_set_point");
    }
    if pool == "1" {
        return parse_set_point(items, "pool_set_point");
    }
    if spa != "0" && spa != "3" {
        return Err(ParseError::UnexpectedField {
            field: "spa_heater",
            value: spa.to_string(),
        });
    }
    if pool != "0" && pool != "3" {
        return Err(ParseError::UnexpectedField {
            field: "pool_heater",
            value: pool.to_string(),
        });
    }

    Ok(0)
}

fn parse_set_point(items: &HashMap<&str, &str>, field: &'static str) -> Result<i64, ParseError> {
    items
        .get(field)
        .copied()
        .unwrap_or("")
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidInteger { field })
}

fn parse_temp(
    items: &HashMap<&str, &str>,
    field: &'static str,
) -> Result<Option<i64>, ParseError> {
    match items.get(field).copied() {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ParseError::InvalidInteger { field }),
    }
}
