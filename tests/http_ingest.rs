use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    sync::Arc,
};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use httpmock::MockServer;
use tower::ServiceExt;
use url::Url;
use zplcast::{
    application::{
        broadcast::BroadcastHub,
        pipeline::PipelineCoordinator,
        render::{GatewayConfig, LabelaryGateway, PageRasterizer, RasterGeometry},
    },
    config::OutputFormat,
    infra::http::{BLANK_DOCUMENT_MESSAGE, HttpState, build_router},
};
use zplcast_events::ViewerEvent;

const LABEL: &str = "^XA^FO50,50^A0N,50,50^FDHELLO^FS^XZ";
const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nlabel";
const BODY_LIMIT: usize = 64 * 1024;

fn gateway_for(endpoint: Url) -> LabelaryGateway {
    let geometry = RasterGeometry {
        dpi: NonZeroU32::new(203).expect("dpi"),
        width_px: NonZeroU32::new(812).expect("width"),
        height_px: NonZeroU32::new(1218).expect("height"),
    };
    LabelaryGateway::new(GatewayConfig {
        endpoint,
        output_format: OutputFormat::Png,
        timeout: None,
        rasterizer: PageRasterizer::new(
            PathBuf::from("pdftoppm"),
            std::env::temp_dir(),
            geometry,
        ),
    })
    .expect("gateway builds")
}

fn app(endpoint: Url) -> (Router, Arc<BroadcastHub>) {
    let hub = Arc::new(BroadcastHub::new(NonZeroUsize::new(8).expect("buffer")));
    let pipeline = PipelineCoordinator::new(Arc::new(gateway_for(endpoint)), hub.clone());
    let router = build_router(
        HttpState {
            pipeline,
            hub: hub.clone(),
        },
        BODY_LIMIT,
    );
    (router, hub)
}

fn mock_endpoint(server: &MockServer) -> Url {
    Url::parse(&server.url("/v1/printers/8dpmm/labels/4x6/0/")).expect("mock url")
}

fn upload(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/pstprnt")
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(body.into())
        .expect("request should build")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

#[tokio::test]
async fn upload_renders_and_broadcasts_to_every_viewer() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("POST")
                .path("/v1/printers/8dpmm/labels/4x6/0/")
                .header("accept", "image/png")
                .body(LABEL);
            then.status(200)
                .header("content-type", "image/png")
                .body(PNG_BYTES);
        })
        .await;

    let (router, hub) = app(mock_endpoint(&server));
    let mut first = hub.connect();
    let mut second = hub.connect();

    let response = router.oneshot(upload(LABEL)).await.expect("router responds");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_text(response).await, "");
    mock.assert_async().await;

    let expected = ViewerEvent::Rendered {
        images: vec![STANDARD.encode(PNG_BYTES)],
    };
    for subscription in [&mut first, &mut second] {
        let event = subscription.try_recv().expect("event delivered");
        assert_eq!(*event, expected);
        assert!(subscription.try_recv().is_none(), "exactly one event");
    }
}

#[tokio::test]
async fn upstream_rejection_returns_bad_gateway_and_broadcasts_error() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("POST");
            then.status(400).body("ERROR: invalid command ^ZZ");
        })
        .await;

    let (router, hub) = app(mock_endpoint(&server));
    let mut viewer = hub.connect();

    let response = router
        .oneshot(upload("^XA^ZZ^XZ"))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        body_text(response).await,
        "rendering service returned 400 Bad Request"
    );
    mock.assert_async().await;

    let event = viewer.try_recv().expect("error event delivered");
    assert_eq!(
        *event,
        ViewerEvent::Error {
            message: "rendering service returned 400 Bad Request".to_string(),
            detail: "ERROR: invalid command ^ZZ".to_string(),
        }
    );
}

#[tokio::test]
async fn empty_render_is_a_conversion_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST");
            then.status(200).header("content-type", "image/png");
        })
        .await;

    let (router, hub) = app(mock_endpoint(&server));
    let mut viewer = hub.connect();

    let response = router.oneshot(upload(LABEL)).await.expect("router responds");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(response).await, "conversion failed");

    let event = viewer.try_recv().expect("error event delivered");
    assert_eq!(
        *event,
        ViewerEvent::Error {
            message: "conversion failed".to_string(),
            detail: String::new(),
        }
    );
}

#[tokio::test]
async fn unreachable_service_is_reported_to_viewers() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);

    let endpoint = Url::parse(&format!("http://{addr}/labels")).expect("url");
    let (router, hub) = app(endpoint);
    let mut viewer = hub.connect();

    let response = router.oneshot(upload(LABEL)).await.expect("router responds");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(
        body_text(response)
            .await
            .starts_with("failed to contact rendering service"),
    );

    match viewer.try_recv().as_deref() {
        Some(ViewerEvent::Error { message, detail }) => {
            assert!(message.starts_with("failed to contact rendering service"));
            assert_eq!(detail, "");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn blank_upload_is_rejected_without_rendering() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("POST");
            then.status(200).body(PNG_BYTES);
        })
        .await;

    let (router, hub) = app(mock_endpoint(&server));
    let mut viewer = hub.connect();

    for body in ["", "   \r\n\t  "] {
        let response = router
            .clone()
            .oneshot(upload(body))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, BLANK_DOCUMENT_MESSAGE);
    }

    assert_eq!(mock.hits_async().await, 0);
    assert!(viewer.try_recv().is_none());
}

#[tokio::test]
async fn non_utf8_upload_is_rejected() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("POST");
            then.status(200).body(PNG_BYTES);
        })
        .await;

    let (router, hub) = app(mock_endpoint(&server));
    let mut viewer = hub.connect();

    let response = router
        .oneshot(upload(vec![0x5e, 0x58, 0x41, 0xff, 0xfe]))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(mock.hits_async().await, 0);
    assert!(viewer.try_recv().is_none());
}

#[tokio::test]
async fn oversized_upload_is_refused() {
    let server = MockServer::start_async().await;
    let (router, _hub) = app(mock_endpoint(&server));

    let response = router
        .oneshot(upload(vec![b'A'; BODY_LIMIT + 1]))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn viewer_page_and_health_are_served() {
    let server = MockServer::start_async().await;
    let (router, _hub) = app(mock_endpoint(&server));

    let index = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router responds");
    assert_eq!(index.status(), StatusCode::OK);
    let content_type = index
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"));
    assert!(body_text(index).await.contains("/static/viewer.js"));

    let script = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/static/viewer.js")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router responds");
    assert_eq!(script.status(), StatusCode::OK);

    let health = router
        .oneshot(
            Request::builder()
                .uri("/_health")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router responds");
    assert_eq!(health.status(), StatusCode::NO_CONTENT);
}
