use std::{process, sync::Arc};

use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use zplcast::{
    application::{
        broadcast::BroadcastHub,
        error::AppError,
        pipeline::PipelineCoordinator,
        render::{GatewayConfig, LabelaryGateway},
    },
    config,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        stream::StreamListener,
        telemetry,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let gateway = LabelaryGateway::new(GatewayConfig::from(&settings.render))?;
    let hub = Arc::new(BroadcastHub::new(settings.broadcast.viewer_buffer));
    let pipeline = PipelineCoordinator::new(Arc::new(gateway), hub.clone());

    info!(
        render_endpoint = %settings.render.endpoint,
        render_format = settings.render.output_format.accept_header(),
        "render gateway configured"
    );

    serve(&settings, pipeline, hub).await
}

async fn serve(
    settings: &config::Settings,
    pipeline: PipelineCoordinator,
    hub: Arc<BroadcastHub>,
) -> Result<(), AppError> {
    let state = HttpState {
        pipeline: pipeline.clone(),
        hub,
    };
    let max_body_bytes = usize::try_from(settings.ingest.max_body_bytes.get())
        .map_err(|err| AppError::unexpected(format!("invalid body limit: {err}")))?;
    let router = http::build_router(state, max_body_bytes);

    let http_addr = settings.server.http_addr;
    let http_listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .map_err(|err| InfraError::bind(http_addr, err))?;
    let stream_listener = StreamListener::bind(settings.server.stream_addr, pipeline).await?;

    info!(
        http_addr = %http_addr,
        stream_addr = %settings.server.stream_addr,
        "zplcast listening: viewer at http://{http_addr}/"
    );

    let http_server = async move {
        axum::serve(http_listener, router.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
    };

    tokio::select! {
        result = http_server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = stream_listener.run() => {}
    }

    info!("zplcast stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
