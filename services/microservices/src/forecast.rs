use axum::routing::get;
use axum::{Json, Router};
use chrono::{Days, NaiveDate, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

const SUMMARIES: [&str; 10] = [
    "Freezing", "Bracing", "Chilly", "Cool", "Mild", "Warm", "Balmy", "Hot", "Sweltering",
    "Scorching",
];

const FORECAST_DAYS: u64 = 5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    /// `YYYY-MM-DD` (UTC).
    pub date: String,
    pub temperature_c: i32,
    pub temperature_f: i32,
    pub summary: &'static str,
}

impl WeatherForecast {
    fn random(date: NaiveDate, rng: &mut impl Rng) -> Self {
        let temperature_c = rng.gen_range(-20..55);
        Self {
            date: date.format("%Y-%m-%d").to_string(),
            temperature_c,
            temperature_f: 32 + (temperature_c as f64 / 0.5556) as i32,
            summary: SUMMARIES.choose(rng).copied().unwrap_or("Mild"),
        }
    }
}

/// `GET /weatherforecast`: five random daily forecasts starting tomorrow.
pub fn routes() -> Router {
    Router::new().route("/weatherforecast", get(forecast_handler))
}

async fn forecast_handler() -> Json<Vec<WeatherForecast>> {
    let today = Utc::now().date_naive();
    let mut rng = rand::thread_rng();
    Json(
        (1..=FORECAST_DAYS)
            .filter_map(|offset| today.checked_add_days(Days::new(offset)))
            .map(|date| WeatherForecast::random(date, &mut rng))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_is_iso_formatted() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let f = WeatherForecast::random(date, &mut rand::thread_rng());
        assert_eq!(f.date, "2024-02-29");
    }

    #[test]
    fn fahrenheit_tracks_celsius() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let f = WeatherForecast::random(NaiveDate::MIN, &mut rng);
            assert!((-20..55).contains(&f.temperature_c));
            assert!(SUMMARIES.contains(&f.summary));
            assert_eq!(f.temperature_f, 32 + (f.temperature_c as f64 / 0.5556) as i32);
        }
    }
}
