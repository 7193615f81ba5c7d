use std::{net::SocketAddr, num::NonZeroUsize, sync::Arc, time::Duration};

use async_trait::async_trait;
use async_tungstenite::{
    WebSocketStream,
    tokio::{ConnectStream, connect_async},
    tungstenite::Message,
};
use futures::StreamExt;
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    time::{sleep, timeout},
};
use zplcast::{
    application::{
        broadcast::BroadcastHub,
        pipeline::PipelineCoordinator,
        render::{RasterImage, RenderFailure, RenderGateway, RenderResult},
    },
    domain::document::Document,
    infra::http::{HttpState, build_router},
};
use zplcast_events::ViewerEvent;

const WAIT: Duration = Duration::from_secs(5);

/// Renders `^XA...^XZ` documents to their own bytes and rejects anything else
/// the way the rendering service rejects unknown commands.
struct EchoGateway;

#[async_trait]
impl RenderGateway for EchoGateway {
    async fn render(&self, document: &Document) -> Result<RenderResult, RenderFailure> {
        if document.as_str().starts_with("^XA") {
            RenderResult::from_images(vec![RasterImage::new(document.as_str().to_owned())])
        } else {
            Err(RenderFailure::upstream(
                "rendering service returned 400 Bad Request",
                Some("ERROR: unknown command".to_string()),
            ))
        }
    }
}

/// Takes its time, then fails the way an unreachable rendering service does.
struct SlowUnreachableGateway;

#[async_trait]
impl RenderGateway for SlowUnreachableGateway {
    async fn render(&self, _document: &Document) -> Result<RenderResult, RenderFailure> {
        sleep(Duration::from_millis(300)).await;
        Err(RenderFailure::upstream(
            "failed to contact rendering service: connection refused",
            None,
        ))
    }
}

async fn start() -> (SocketAddr, Arc<BroadcastHub>) {
    start_with(Arc::new(EchoGateway)).await
}

async fn start_with(gateway: Arc<dyn RenderGateway>) -> (SocketAddr, Arc<BroadcastHub>) {
    let hub = Arc::new(BroadcastHub::new(NonZeroUsize::new(8).expect("buffer")));
    let pipeline = PipelineCoordinator::new(gateway, hub.clone());
    let router = build_router(
        HttpState {
            pipeline,
            hub: hub.clone(),
        },
        64 * 1024,
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind http");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .expect("server runs");
    });
    (addr, hub)
}

async fn connect_viewer(addr: SocketAddr) -> WebSocketStream<ConnectStream> {
    let (socket, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("viewer connects");
    socket
}

async fn wait_for_viewers(hub: &BroadcastHub, expected: usize) {
    timeout(WAIT, async {
        while hub.viewer_count() != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("viewer count reached");
}

async fn next_event(socket: &mut WebSocketStream<ConnectStream>) -> ViewerEvent {
    loop {
        let message = timeout(WAIT, socket.next())
            .await
            .expect("frame within deadline")
            .expect("socket open")
            .expect("frame readable");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("viewer event json");
        }
    }
}

async fn upload(addr: SocketAddr, body: &'static str) -> reqwest::StatusCode {
    reqwest::Client::new()
        .post(format!("http://{addr}/pstprnt"))
        .body(body)
        .send()
        .await
        .expect("upload sent")
        .status()
}

#[tokio::test]
async fn every_viewer_receives_each_render() {
    let (addr, hub) = start().await;
    let mut first = connect_viewer(addr).await;
    let mut second = connect_viewer(addr).await;
    wait_for_viewers(&hub, 2).await;

    assert_eq!(upload(addr, "^XA^FDHELLO^FS^XZ").await, 202);

    let expected = ViewerEvent::Rendered {
        images: vec![RasterImage::new("^XA^FDHELLO^FS^XZ").to_base64()],
    };
    assert_eq!(next_event(&mut first).await, expected);
    assert_eq!(next_event(&mut second).await, expected);
}

#[tokio::test]
async fn failures_reach_viewers_as_error_events() {
    let (addr, hub) = start().await;
    let mut viewer = connect_viewer(addr).await;
    wait_for_viewers(&hub, 1).await;

    assert_eq!(upload(addr, "garbage").await, 502);

    assert_eq!(
        next_event(&mut viewer).await,
        ViewerEvent::Error {
            message: "rendering service returned 400 Bad Request".to_string(),
            detail: "ERROR: unknown command".to_string(),
        }
    );
}

#[tokio::test]
async fn late_viewers_get_no_backlog_and_closed_viewers_are_released() {
    let (addr, hub) = start().await;
    let mut early = connect_viewer(addr).await;
    wait_for_viewers(&hub, 1).await;

    assert_eq!(upload(addr, "^XA^FDfirst^FS^XZ").await, 202);
    assert_eq!(
        next_event(&mut early).await,
        ViewerEvent::Rendered {
            images: vec![RasterImage::new("^XA^FDfirst^FS^XZ").to_base64()],
        }
    );

    let mut late = connect_viewer(addr).await;
    wait_for_viewers(&hub, 2).await;
    early.close(None).await.expect("close early viewer");
    wait_for_viewers(&hub, 1).await;

    assert_eq!(upload(addr, "^XA^FDsecond^FS^XZ").await, 202);
    assert_eq!(
        next_event(&mut late).await,
        ViewerEvent::Rendered {
            images: vec![RasterImage::new("^XA^FDsecond^FS^XZ").to_base64()],
        }
    );
}

#[tokio::test]
async fn transport_failure_reaches_every_viewer_identically() {
    let (addr, hub) = start_with(Arc::new(SlowUnreachableGateway)).await;
    let mut first = connect_viewer(addr).await;
    let mut second = connect_viewer(addr).await;
    wait_for_viewers(&hub, 2).await;

    assert_eq!(upload(addr, "^XA^FDHELLO^FS^XZ").await, 502);

    let expected = ViewerEvent::Error {
        message: "failed to contact rendering service: connection refused".to_string(),
        detail: String::new(),
    };
    assert_eq!(next_event(&mut first).await, expected);
    assert_eq!(next_event(&mut second).await, expected);
}

#[tokio::test]
async fn render_completes_after_publisher_hangs_up() {
    let (addr, hub) = start_with(Arc::new(SlowUnreachableGateway)).await;
    let mut viewer = connect_viewer(addr).await;
    wait_for_viewers(&hub, 1).await;

    let body = "^XA^FDHELLO^FS^XZ";
    let request = format!(
        "POST /pstprnt HTTP/1.1\r\nHost: {addr}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let mut publisher = TcpStream::connect(addr).await.expect("connect publisher");
    publisher
        .write_all(request.as_bytes())
        .await
        .expect("send upload");
    publisher.flush().await.expect("flush");
    sleep(Duration::from_millis(100)).await;
    drop(publisher);

    assert_eq!(
        next_event(&mut viewer).await,
        ViewerEvent::Error {
            message: "failed to contact rendering service: connection refused".to_string(),
            detail: String::new(),
        }
    );
}
