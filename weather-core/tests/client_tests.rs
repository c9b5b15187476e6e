use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use weather_core::{ApiConfig, WeatherClient, WeatherError};

fn client_for(server: &MockServer) -> WeatherClient {
    WeatherClient::new(Client::new(), &format!("{}/api", server.uri())).unwrap()
}

#[tokio::test]
async fn locality_info_returns_body_unchanged() {
    let server = MockServer::start().await;
    let body = json!({ "geoid": 213, "name": "Moscow", "weather": { "temp": 5, "wind": [3, "nw"] } });

    Mock::given(method("GET"))
        .and(path("/api/localities/213"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let info = client.locality_info(213).await.unwrap();
    assert_eq!(info, body);
}

#[tokio::test]
async fn cities_and_provinces_hit_their_paths() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/localities/54/cities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "geoid": 1 }, { "geoid": 2 }])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/localities/54/provinces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "geoid": 11162 }])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let cities = client.cities(54).await.unwrap();
    assert_eq!(cities.as_array().map(Vec::len), Some(2));

    let provinces = client.provinces(54).await.unwrap();
    assert_eq!(provinces, json!([{ "geoid": 11162 }]));
}

#[tokio::test]
async fn factual_joins_ids_with_commas() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/factual"))
        .and(query_param("ids", "213,54,2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "213": { "temp": 5 } })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let factual = client.factual(&[213, 54, 2]).await.unwrap();
    assert_eq!(factual["213"]["temp"], 5);
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/localities/213"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "error": "down" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    match client.locality_info(213).await {
        Err(WeatherError::Status { status, url }) => {
            assert_eq!(status.as_u16(), 503);
            assert!(url.ends_with("/api/localities/213"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_json_is_a_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/localities/213"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string("{ not json"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.locality_info(213).await.unwrap_err();
    assert!(matches!(err, WeatherError::Decode(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_service_is_a_network_error() {
    let client = WeatherClient::new(Client::new(), "http://127.0.0.1:1/api").unwrap();
    let err = client.locality_info(213).await.unwrap_err();
    assert!(matches!(err, WeatherError::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn client_from_config_uses_base_url() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/localities/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "temp": -3 })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ApiConfig {
        base_url: format!("{}/api/", server.uri()),
        request_timeout_ms: Some(2_000),
        ..ApiConfig::default()
    };
    let client = WeatherClient::from_config(&config).unwrap();
    assert_eq!(client.locality_info(2).await.unwrap(), json!({ "temp": -3 }));
}
