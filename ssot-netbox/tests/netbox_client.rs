use serde_json::{json, Map, Value};
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ssot_core::config::NetboxConfig;
use ssot_core::{EntityKind, ObjectId};
use ssot_netbox::NetboxClient;
use ssot_sync::{RemoteClient, RemoteError};

fn config(url: String, max_retries: u32) -> NetboxConfig {
    NetboxConfig {
        url,
        token: "0123456789abcdef".into(),
        timeout_secs: 5,
        max_retries,
        page_size: 2,
        validate_cert: true,
    }
}

fn client(server: &MockServer, max_retries: u32) -> NetboxClient {
    NetboxClient::new(&config(server.uri(), max_retries)).unwrap()
}

#[tokio::test]
async fn list_follows_next_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/dcim/sites/"))
        .and(query_param("limit", "2"))
        .and(query_param_is_missing("offset"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "next": format!("{}/api/dcim/sites/?limit=2&offset=2", server.uri()),
            "results": [{"id": 1, "name": "NYC"}, {"id": 2, "name": "LAX"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dcim/sites/"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "next": null,
            "results": [{"id": 3, "name": "SFO"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sites = client(&server, 0).list(EntityKind::Site).await.unwrap();

    let names: Vec<&str> = sites.iter().filter_map(|s| s["name"].as_str()).collect();
    assert_eq!(names, ["NYC", "LAX", "SFO"]);
}

#[tokio::test]
async fn requests_carry_the_api_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/extras/tags/"))
        .and(header("Authorization", "Token 0123456789abcdef"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"next": null, "results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let tags = client(&server, 0).list(EntityKind::Tag).await.unwrap();
    assert!(tags.is_empty());
}

#[tokio::test]
async fn list_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/dcim/sites/"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dcim/sites/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "next": null,
            "results": [{"id": 1, "name": "NYC"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sites = client(&server, 2).list(EntityKind::Site).await.unwrap();
    assert_eq!(sites.len(), 1);
}

#[tokio::test]
async fn list_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/dcim/sites/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(2)
        .mount(&server)
        .await;

    let err = client(&server, 1).list(EntityKind::Site).await.unwrap_err();
    assert_eq!(
        err,
        RemoteError::Status {
            status: 503,
            body: "maintenance".into()
        }
    );
}

#[tokio::test]
async fn list_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/dcim/sites/"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Invalid token"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 3).list(EntityKind::Site).await.unwrap_err();
    assert!(matches!(err, RemoteError::Status { status: 403, .. }));
}

#[tokio::test]
async fn create_posts_to_the_collection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dcim/sites/"))
        .and(body_json(json!({"name": "NYC", "slug": "nyc"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 11,
            "name": "NYC",
            "slug": "nyc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server, 0)
        .create(EntityKind::Site, &json!({"name": "NYC", "slug": "nyc"}))
        .await
        .unwrap();
    assert_eq!(created["id"], json!(11));
}

#[tokio::test]
async fn create_is_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dcim/sites/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 3)
        .create(EntityKind::Site, &json!({"name": "NYC"}))
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Status { status: 503, .. }));
}

#[tokio::test]
async fn patch_sends_only_the_diff() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/virtualization/virtual-machines/42/"))
        .and(body_json(json!({"vcpus": 4.0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "name": "web01",
            "vcpus": 4.0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut diff = Map::new();
    diff.insert("vcpus".into(), Value::from(4.0));
    let patched = client(&server, 0)
        .patch(EntityKind::Vm, ObjectId(42), &diff)
        .await
        .unwrap();
    assert_eq!(patched["vcpus"], json!(4.0));
}

#[tokio::test]
async fn patch_rejection_keeps_the_body() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/dcim/sites/5/"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"slug":["already exists"]}"#),
        )
        .mount(&server)
        .await;

    let err = client(&server, 0)
        .patch(EntityKind::Site, ObjectId(5), &Map::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::Status {
            status: 400,
            body: r#"{"slug":["already exists"]}"#.into()
        }
    );
}

#[tokio::test]
async fn delete_maps_404_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/dcim/devices/9/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/dcim/devices/10/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, 0);
    let err = client
        .delete(EntityKind::Device, ObjectId(9))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::NotFound {
            kind: EntityKind::Device,
            id: ObjectId(9)
        }
    );
    client.delete(EntityKind::Device, ObjectId(10)).await.unwrap();
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    // Nothing listens on port 1.
    let client = NetboxClient::new(&config("http://127.0.0.1:1".into(), 0)).unwrap();

    let err = client.list(EntityKind::Site).await.unwrap_err();
    assert!(matches!(err, RemoteError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn client_without_certificate_checks_still_works() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/dcim/sites/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "next": null,
            "results": [{"id": 1, "name": "NYC"}]
        })))
        .mount(&server)
        .await;

    let mut insecure = config(server.uri(), 0);
    insecure.validate_cert = false;
    let client = NetboxClient::new(&insecure).unwrap();

    let sites = client.list(EntityKind::Site).await.unwrap();
    assert_eq!(sites.len(), 1);
}
