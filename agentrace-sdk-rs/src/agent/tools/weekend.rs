use async_trait::async_trait;
use chrono::Local;
use rand::Rng;
use serde_json::{Value, json};

use super::{Tool, string_arg};

pub struct GetCurrentDateTool;

#[async_trait]
impl Tool for GetCurrentDateTool {
    fn name(&self) -> String {
        "get_current_date".to_string()
    }

    fn description(&self) -> String {
        "Gets the current date from the system and returns as YYYY-MM-DD.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(&self, _args: Value) -> Result<Value, String> {
        tracing::info!("Getting current date");
        Ok(Value::String(Local::now().format("%Y-%m-%d").to_string()))
    }
}

/// Simulated forecast: sunny now and then, rainy otherwise.
pub struct GetWeatherTool {
    sunny_probability: f64,
}

impl GetWeatherTool {
    pub fn new() -> Self {
        Self {
            sunny_probability: 0.05,
        }
    }

    pub fn with_sunny_probability(probability: f64) -> Self {
        Self {
            sunny_probability: probability.clamp(0.0, 1.0),
        }
    }
}

impl Default for GetWeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> String {
        "get_weather".to_string()
    }

    fn description(&self) -> String {
        "Returns weather data for a given city.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "The city to look up"
                }
            },
            "required": ["city"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value, String> {
        let city = string_arg(&args, "city")?;
        tracing::info!("Getting weather for {}", city);

        let sunny = rand::rng().random_bool(self.sunny_probability);
        if sunny {
            Ok(json!({ "city": city, "temperature": 72, "description": "Sunny" }))
        } else {
            Ok(json!({ "city": city, "temperature": 60, "description": "Rainy" }))
        }
    }
}

pub struct GetActivitiesTool;

#[async_trait]
impl Tool for GetActivitiesTool {
    fn name(&self) -> String {
        "get_activities".to_string()
    }

    fn description(&self) -> String {
        "Returns a list of activities for a given city and date.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": { "type": "string" },
                "date": {
                    "type": "string",
                    "description": "Date as YYYY-MM-DD"
                }
            },
            "required": ["city", "date"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value, String> {
        let city = string_arg(&args, "city")?;
        let date = string_arg(&args, "date")?;
        tracing::info!("Getting activities for {} on {}", city, date);

        Ok(json!([
            { "name": "Hiking", "location": city },
            { "name": "Beach", "location": city },
            { "name": "Museum", "location": city },
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_current_date_format() {
        let value = GetCurrentDateTool.call(json!({})).await.unwrap();
        let date = value.as_str().unwrap();
        assert!(chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok());
    }

    #[tokio::test]
    async fn test_weather_probability_extremes() {
        let rainy = GetWeatherTool::with_sunny_probability(0.0)
            .call(json!({"city": "Seattle"}))
            .await
            .unwrap();
        assert_eq!(rainy["description"], "Rainy");
        assert_eq!(rainy["temperature"], 60);

        let sunny = GetWeatherTool::with_sunny_probability(1.0)
            .call(json!({"city": "Seattle"}))
            .await
            .unwrap();
        assert_eq!(sunny["description"], "Sunny");
    }

    #[tokio::test]
    async fn test_activities_require_date() {
        let err = GetActivitiesTool
            .call(json!({"city": "Seattle"}))
            .await
            .unwrap_err();
        assert!(err.contains("date"));

        let list = GetActivitiesTool
            .call(json!({"city": "Seattle", "date": "2026-10-17"}))
            .await
            .unwrap();
        assert_eq!(list.as_array().unwrap().len(), 3);
        assert_eq!(list[2]["name"], "Museum");
    }
}
