use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;

use iptv_catalog_lib::api::XtreamClient;
use iptv_catalog_lib::catalog::{Credentials, PlaylistSource};
use iptv_catalog_lib::errors::{ApiCall, CatalogError};
use iptv_catalog_lib::ingest::{ingest, FetchContext};

fn action(name: &str) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("username".into(), "alice".into()),
        Matcher::UrlEncoded("password".into(), "s3cret".into()),
        Matcher::UrlEncoded("action".into(), name.into()),
    ])
}

async fn mock_action(server: &mut ServerGuard, name: &str, status: usize, body: serde_json::Value) -> Mock {
    server
        .mock("GET", "/player_api.php")
        .match_query(action(name))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

fn client(server: &ServerGuard) -> XtreamClient {
    XtreamClient::new(
        format!("{}/", server.url()),
        Credentials::new("alice", Some("s3cret".into())),
        FetchContext::offline(false),
    )
}

#[tokio::test]
async fn test_catalog_from_categories_and_streams() {
    let mut server = mockito::Server::new_async().await;
    let categories = mock_action(
        &mut server,
        "get_live_categories",
        200,
        json!([
            {"category_id": "1", "category_name": "News", "parent_id": 0},
            {"category_id": 2, "category_name": "Sports", "parent_id": 0}
        ]),
    )
    .await;
    let streams = mock_action(
        &mut server,
        "get_live_streams",
        200,
        json!([
            {"num": 1, "name": "Sports HD", "stream_id": 20, "stream_icon": "", "category_id": "2", "container_extension": "m3u8", "epg_channel_id": "sports.hd"},
            {"num": 2, "name": "News 24", "stream_id": "10", "stream_icon": "http://img.test/n.png", "category_id": 1, "epg_channel_id": null},
            {"num": 3, "name": "Mystery", "stream_id": 30, "category_id": "404"}
        ]),
    )
    .await;

    let categories_out = client(&server).fetch_catalog().await.unwrap();
    categories.assert_async().await;
    streams.assert_async().await;

    let names: Vec<_> = categories_out.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["General", "News", "Sports"]);

    let news = &categories_out[1].channels[0];
    assert_eq!(news.id, "10");
    assert_eq!(news.name, "News 24");
    assert_eq!(news.url, format!("{}/live/alice/s3cret/10.ts", server.url()));
    assert_eq!(news.logo.as_deref(), Some("http://img.test/n.png"));
    assert_eq!(news.epg_id, None);

    let sports = &categories_out[2].channels[0];
    assert_eq!(sports.url, format!("{}/live/alice/s3cret/20.m3u8", server.url()));
    assert_eq!(sports.epg_id.as_deref(), Some("sports.hd"));
    assert_eq!(sports.logo, None);

    assert_eq!(categories_out[0].channels[0].name, "Mystery");
}

#[tokio::test]
async fn test_categories_failure_stops_before_streams() {
    let mut server = mockito::Server::new_async().await;
    let _categories = mock_action(&mut server, "get_live_categories", 500, json!({"error": "down"})).await;
    let streams = server
        .mock("GET", "/player_api.php")
        .match_query(action("get_live_streams"))
        .expect(0)
        .create_async()
        .await;

    let err = client(&server).fetch_catalog().await.unwrap_err();
    assert_eq!(
        err,
        CatalogError::Api {
            call: ApiCall::Categories,
            status: 500
        }
    );
    streams.assert_async().await;
}

#[tokio::test]
async fn test_streams_failure_abandons_whole_listing() {
    let mut server = mockito::Server::new_async().await;
    let _categories = mock_action(
        &mut server,
        "get_live_categories",
        200,
        json!([{"category_id": "1", "category_name": "News"}]),
    )
    .await;
    let _streams = mock_action(&mut server, "get_live_streams", 403, json!([])).await;

    let err = client(&server).fetch_catalog().await.unwrap_err();
    assert_eq!(err.call(), Some(ApiCall::Streams));
    assert!(matches!(err, CatalogError::Api { status: 403, .. }));
}

#[tokio::test]
async fn test_malformed_stream_list_is_a_network_error() {
    let mut server = mockito::Server::new_async().await;
    let _categories = mock_action(&mut server, "get_live_categories", 200, json!([])).await;
    let _streams = mock_action(&mut server, "get_live_streams", 200, json!({"user_info": {"auth": 0}})).await;

    let err = client(&server).fetch_channels().await.unwrap_err();
    assert!(matches!(err, CatalogError::Network { call: ApiCall::Streams, .. }));
}

#[tokio::test]
async fn test_missing_password_is_an_empty_segment() {
    let mut server = mockito::Server::new_async().await;
    let _categories = server
        .mock("GET", "/player_api.php")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("password".into(), "".into()),
            Matcher::UrlEncoded("action".into(), "get_live_categories".into()),
        ]))
        .with_body("[]")
        .create_async()
        .await;
    let _streams = server
        .mock("GET", "/player_api.php")
        .match_query(Matcher::UrlEncoded("action".into(), "get_live_streams".into()))
        .with_body(json!([{"stream_id": 7, "name": "Seven"}]).to_string())
        .create_async()
        .await;

    let source = PlaylistSource::xtream(server.url(), Credentials::new("bob", None));
    let categories = ingest(&FetchContext::offline(false), &source).await.unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(
        categories[0].channels[0].url,
        format!("{}/live/bob//7.ts", server.url())
    );
}

#[tokio::test]
async fn test_unreachable_server_is_a_categories_network_error() {
    let client = XtreamClient::new(
        "http://127.0.0.1:1",
        Credentials::new("u", None),
        FetchContext::offline(false),
    );
    let err = client.fetch_channels().await.unwrap_err();
    assert!(matches!(err, CatalogError::Network { call: ApiCall::Categories, .. }));
}

#[tokio::test]
async fn test_zero_padded_stream_id_is_used_as_sent() {
    let mut server = mockito::Server::new_async().await;
    let _categories = mock_action(&mut server, "get_live_categories", 200, json!([])).await;
    let _streams = mock_action(
        &mut server,
        "get_live_streams",
        200,
        json!([{"stream_id": "0042", "name": "Z"}]),
    )
    .await;

    let channels = client(&server).fetch_channels().await.unwrap();
    assert_eq!(channels[0].id, "0042");
    assert_eq!(channels[0].url, format!("{}/live/alice/s3cret/0042.ts", server.url()));
}
