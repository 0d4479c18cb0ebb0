use chrono::{NaiveDate, NaiveDateTime};
use cityweather_core::db::open_db_in_memory;
use cityweather_core::{
    CityRepository, Coordinates, EtlConfig, ForecastSeries, GeoPoint, Geocoder,
    HistoricalSnapshot, HourlySample, IngestError, IngestService, SourceError, SourceResult,
    SqliteCityRepository, SqliteWeatherRepository, WeatherRepository, WeatherSource,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

struct FakeGeocoder {
    known: HashMap<&'static str, (f64, f64)>,
}

impl FakeGeocoder {
    fn new() -> Self {
        Self {
            known: HashMap::from([
                ("Bern", (46.95, 7.45)),
                ("Reykjavík", (64.15, -21.94)),
                ("Dublin", (53.35, -6.26)),
                ("Brasília", (-15.79, -47.88)),
            ]),
        }
    }
}

impl Geocoder for FakeGeocoder {
    fn geocode(&self, city: &str) -> SourceResult<GeoPoint> {
        let (latitude, longitude) = self
            .known
            .get(city)
            .copied()
            .ok_or_else(|| SourceError::NotFound(city.to_string()))?;
        Ok(GeoPoint {
            name: city.to_string(),
            latitude,
            longitude,
        })
    }
}

/// Grid-snaps each point and serves a flat temperature per side of June 10.
struct FakeWeather {
    profiles: HashMap<&'static str, (f64, f64, f64)>,
    historical_requests: Rc<RefCell<Vec<Vec<Coordinates>>>>,
}

impl FakeWeather {
    fn new() -> Self {
        Self {
            // name -> (elevation, past temperature, upcoming temperature)
            profiles: HashMap::from([
                ("Bern", (549.0, 14.0, 18.0)),
                ("Reykjavík", (61.0, 8.0, 9.0)),
                ("Dublin", (8.0, 12.0, 13.0)),
                ("Brasília", (1100.0, 23.0, 24.0)),
            ]),
            historical_requests: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

fn hour(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

impl WeatherSource for FakeWeather {
    fn forecast(
        &self,
        points: &[GeoPoint],
        past_days: u32,
        forecast_days: u32,
    ) -> SourceResult<Vec<ForecastSeries>> {
        assert_eq!((past_days, forecast_days), (8, 8));
        Ok(points
            .iter()
            .map(|point| {
                let (elevation, past, upcoming) = self.profiles[point.name.as_str()];
                ForecastSeries {
                    coordinates: Coordinates::from_degrees(
                        (point.latitude * 4.0).round() / 4.0,
                        (point.longitude * 4.0).round() / 4.0,
                    ),
                    elevation,
                    timezone_abbreviation: Some("GMT".to_string()),
                    samples: vec![
                        HourlySample {
                            time: hour(9, 12),
                            temperature: Some(past),
                        },
                        HourlySample {
                            time: hour(9, 13),
                            temperature: None,
                        },
                        HourlySample {
                            time: hour(10, 0),
                            temperature: Some(upcoming),
                        },
                    ],
                }
            })
            .collect())
    }

    fn historical(
        &self,
        coordinates: &[Coordinates],
        date: NaiveDate,
    ) -> SourceResult<Vec<HistoricalSnapshot>> {
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        self.historical_requests
            .borrow_mut()
            .push(coordinates.to_vec());
        Ok(coordinates
            .iter()
            .map(|coords| HistoricalSnapshot {
                coordinates: coords.clone(),
                temperature: Some(-1.5),
                relative_humidity: Some(80.4),
                wind_speed: Some(9.25),
            })
            .collect())
    }
}

struct FailingWeather;

impl WeatherSource for FailingWeather {
    fn forecast(&self, _: &[GeoPoint], _: u32, _: u32) -> SourceResult<Vec<ForecastSeries>> {
        Err(SourceError::Status {
            status: 400,
            body: "{\"error\":true}".to_string(),
        })
    }

    fn historical(&self, _: &[Coordinates], _: NaiveDate) -> SourceResult<Vec<HistoricalSnapshot>> {
        Ok(Vec::new())
    }
}

fn config(cities: &[&str]) -> EtlConfig {
    EtlConfig {
        target_cities: cities.iter().map(|city| city.to_string()).collect(),
        ..EtlConfig::default()
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

#[test]
fn run_loads_only_cities_passing_thresholds() {
    let conn = open_db_in_memory().unwrap();
    let service = IngestService::new(
        FakeGeocoder::new(),
        FakeWeather::new(),
        config(&["Bern", "Reykjavík", "Dublin", "Brasília", "Atlantis"]),
    );

    let report = service.run(&conn, today()).unwrap();
    assert_eq!(report.cities_requested, 5);
    assert_eq!(report.cities_geocoded, 4);
    assert_eq!(report.series_fetched, 4);
    assert_eq!(report.cities_selected, 2);
    assert_eq!(report.cities_loaded, 2);
    assert_eq!(report.weather_loaded, 2);
    assert!(report.skipped_tables.is_empty());

    let cities = SqliteCityRepository::try_new(&conn)
        .unwrap()
        .list_cities()
        .unwrap();
    let keys: Vec<_> = cities.iter().map(|city| city.coordinates.clone()).collect();
    assert_eq!(
        keys,
        vec![
            Coordinates::new("47.0", "7.5"),
            Coordinates::new("64.25", "-22.0"),
        ]
    );

    let bern = SqliteWeatherRepository::try_new(&conn)
        .unwrap()
        .get_weather(&Coordinates::new("47.0", "7.5"))
        .unwrap()
        .unwrap();
    assert_eq!(bern.avg_temp_last_week, 14.0);
    assert_eq!(bern.avg_temp_next_week, Some(18.0));
    assert_eq!(bern.year_start_temp, Some(-1.5));
    assert_eq!(bern.year_start_humidity, Some(80));
    assert_eq!(bern.year_start_wind_speed, Some(9.25));
}

#[test]
fn historical_request_covers_selected_cities_only() {
    let conn = open_db_in_memory().unwrap();
    let weather = FakeWeather::new();
    let requests = Rc::clone(&weather.historical_requests);
    let service = IngestService::new(FakeGeocoder::new(), weather, config(&["Dublin", "Bern"]));

    let report = service.run(&conn, today()).unwrap();
    assert_eq!(report.cities_selected, 1);

    let requests = requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0], vec![Coordinates::new("47.0", "7.5")]);
}

#[test]
fn rerun_skips_duplicate_batches_without_failing() {
    let conn = open_db_in_memory().unwrap();
    let service = IngestService::new(
        FakeGeocoder::new(),
        FakeWeather::new(),
        config(&["Bern", "Reykjavík"]),
    );

    service.run(&conn, today()).unwrap();
    let second = service.run(&conn, today()).unwrap();

    assert_eq!(second.cities_loaded, 0);
    assert_eq!(second.weather_loaded, 0);
    assert_eq!(
        second.skipped_tables,
        vec!["cities_data", "weather_aggregated"]
    );
    assert_eq!(
        SqliteCityRepository::try_new(&conn)
            .unwrap()
            .count_cities()
            .unwrap(),
        2
    );
}

#[test]
fn run_without_resolvable_cities_loads_nothing() {
    let conn = open_db_in_memory().unwrap();
    let service = IngestService::new(FakeGeocoder::new(), FailingWeather, config(&["Atlantis"]));

    let report = service.run(&conn, today()).unwrap();
    assert_eq!(report.cities_geocoded, 0);
    assert_eq!(report.cities_loaded, 0);
}

#[test]
fn forecast_failure_aborts_run() {
    let conn = open_db_in_memory().unwrap();
    let service = IngestService::new(FakeGeocoder::new(), FailingWeather, config(&["Bern"]));

    let err = service.run(&conn, today()).unwrap_err();
    assert!(matches!(
        err,
        IngestError::Source(SourceError::Status { status: 400, .. })
    ));
}

#[test]
fn rerun_with_new_and_stored_cities_skips_both_tables_in_any_order() {
    for order in [["Bern", "Reykjavík"], ["Reykjavík", "Bern"]] {
        let conn = open_db_in_memory().unwrap();
        IngestService::new(FakeGeocoder::new(), FakeWeather::new(), config(&["Bern"]))
            .run(&conn, today())
            .unwrap();

        let second = IngestService::new(FakeGeocoder::new(), FakeWeather::new(), config(&order))
            .run(&conn, today())
            .unwrap();

        assert_eq!(second.cities_selected, 2, "order {order:?}");
        assert_eq!(second.cities_loaded, 0, "order {order:?}");
        assert_eq!(second.weather_loaded, 0, "order {order:?}");
        assert_eq!(
            second.skipped_tables,
            vec!["cities_data", "weather_aggregated"],
            "order {order:?}"
        );
        assert_eq!(
            SqliteCityRepository::try_new(&conn)
                .unwrap()
                .count_cities()
                .unwrap(),
            1
        );
        assert_eq!(
            SqliteWeatherRepository::try_new(&conn)
                .unwrap()
                .count_weather()
                .unwrap(),
            1
        );
    }
}
