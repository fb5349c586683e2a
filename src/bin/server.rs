use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use terrain_mesh::config::GenerationRequest;
use terrain_mesh::{
    EngineError, GenerationPipeline, Snapshot, Stage, Timing, render, river_segments,
};

const PREVIEW_SIZE: usize = 768;

type AppState = Arc<GenerationPipeline>;

#[derive(Serialize)]
struct GenerateResponse {
    cmd: &'static str,
    run: u64,
    regions: usize,
    triangles: usize,
    peaks: usize,
    timings: Vec<Timing>,
}

#[derive(Serialize)]
struct ErrorResponse {
    cmd: String,
    error: String,
}

#[derive(Serialize)]
struct StageResponse {
    stage: Stage,
}

#[derive(Serialize)]
struct Layer {
    name: String,
    data_url: String,
}

#[derive(Serialize)]
struct PreviewResponse {
    run: u64,
    layers: Vec<Layer>,
    width: usize,
    height: usize,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(cmd: &str, status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            cmd: format!("{cmd}Error"),
            error: error.to_string(),
        }),
    )
}

fn engine_error(cmd: &str, err: EngineError) -> ApiError {
    let status = match err {
        EngineError::Cancelled => StatusCode::CONFLICT,
        EngineError::WorkerPanic(_) | EngineError::WorkerUnavailable => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    api_error(cmd, status, err)
}

fn encode_png(rgba: &[u8], w: usize, h: usize) -> Result<String, image::ImageError> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new(&mut buf);
    encoder.write_image(rgba, w as u32, h as u32, image::ExtendedColorType::Rgba8)?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(&buf);
    Ok(format!("data:image/png;base64,{}", b64))
}

async fn generate_handler(
    State(pipeline): State<AppState>,
    Json(req): Json<GenerationRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let run = pipeline.request(req);
    let snapshot = tokio::task::spawn_blocking(move || pipeline.wait(run))
        .await
        .map_err(|err| api_error("generate", StatusCode::INTERNAL_SERVER_ERROR, err))?
        .map_err(|err| engine_error("generate", err))?;

    Ok(Json(GenerateResponse {
        cmd: "generate",
        run: snapshot.run,
        regions: snapshot.mesh.num_regions(),
        triangles: snapshot.mesh.num_triangles(),
        peaks: snapshot.peaks.len(),
        timings: snapshot.timings.clone(),
    }))
}

fn latest(pipeline: &GenerationPipeline, cmd: &str) -> Result<Arc<Snapshot>, ApiError> {
    pipeline
        .snapshot()
        .ok_or_else(|| api_error(cmd, StatusCode::NOT_FOUND, "no terrain generated yet"))
}

async fn snapshot_handler(
    State(pipeline): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = latest(&pipeline, "snapshot")?;
    serde_json::to_value(&*snapshot)
        .map(Json)
        .map_err(|err| api_error("snapshot", StatusCode::INTERNAL_SERVER_ERROR, err))
}

async fn cancel_handler(State(pipeline): State<AppState>) -> Json<StageResponse> {
    pipeline.cancel();
    Json(StageResponse {
        stage: pipeline.stage(),
    })
}

async fn stage_handler(State(pipeline): State<AppState>) -> Json<StageResponse> {
    Json(StageResponse {
        stage: pipeline.stage(),
    })
}

async fn preview_handler(
    State(pipeline): State<AppState>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let snapshot = latest(&pipeline, "preview")?;
    let response = tokio::task::spawn_blocking(move || -> Result<PreviewResponse, ApiError> {
        let mesh = &snapshot.mesh;
        let segments = river_segments(mesh, &snapshot.request.rivers)
            .map_err(|err| engine_error("preview", err))?;
        let (w, h) = (PREVIEW_SIZE, PREVIEW_SIZE);
        let encode = |name: &str, rgba: Vec<u8>| {
            encode_png(&rgba, w, h)
                .map(|data_url| Layer {
                    name: name.into(),
                    data_url,
                })
                .map_err(|err| api_error("preview", StatusCode::INTERNAL_SERVER_ERROR, err))
        };
        let layers = vec![
            encode("elevation", render::render_elevation(mesh, w, h))?,
            encode("rivers", render::render_rivers(mesh, &segments, w, h))?,
            encode("mesh", render::render_mesh(mesh, w, h))?,
        ];
        Ok(PreviewResponse {
            run: snapshot.run,
            layers,
            width: w,
            height: h,
        })
    })
    .await
    .map_err(|err| api_error("preview", StatusCode::INTERNAL_SERVER_ERROR, err))??;

    Ok(Json(response))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let pipeline = Arc::new(GenerationPipeline::with_observer(Arc::new(|run, stage| {
        if stage == Stage::Failed {
            warn!(run, ?stage, "stage");
        } else {
            info!(run, ?stage, "stage");
        }
    })));

    let frontend = ServeDir::new("frontend");

    let app = Router::new()
        .route("/api/generate", post(generate_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/api/cancel", post(cancel_handler))
        .route("/api/stage", get(stage_handler))
        .route("/api/preview", get(preview_handler))
        .with_state(pipeline)
        .layer(CorsLayer::permissive())
        .fallback_service(frontend);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    info!("terrain server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind server address");
    axum::serve(listener, app).await.expect("server error");
}
