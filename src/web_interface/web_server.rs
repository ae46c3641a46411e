use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use crate::data_capture::recorder::Recorder;

use super::types::{ApiError, ExportRequest, ExportResponse, StatusResponse};

/// Control surface for the recorder: the HTTP stand-in for the buttons
/// and count label of a desktop front end. It only ever calls the four
/// gated operations and reads count/state, consulting the gating
/// predicates to report refusals instead of hiding them.
pub struct WebServer {
    recorder: Arc<Recorder>,
    export_dir: PathBuf,
}

impl WebServer {
    /// Create a new WebServer instance
    pub fn new(recorder: Arc<Recorder>, export_dir: PathBuf) -> Self {
        Self {
            recorder,
            export_dir,
        }
    }

    /// Start the control server on the given address and port
    pub async fn start(&self, bind_addr: IpAddr, port: u16) {
        // Clone shared deps into filters
        let for_status = Arc::clone(&self.recorder);
        let for_start = Arc::clone(&self.recorder);
        let for_stop = Arc::clone(&self.recorder);
        let for_clear = Arc::clone(&self.recorder);
        let for_export = Arc::clone(&self.recorder);
        let export_dir = self.export_dir.clone();

        // GET / -> minimal dashboard
        let dashboard = warp::path::end().and(warp::get()).and_then(|| async move {
            let html = r#"<html><head><title>capteur</title></head>
                <body><h1>capteur is running</h1>
                <p>See /status for JSON; POST /start, /stop, /clear, /export to control the capture.</p>
                </body></html>"#
                .to_string();
            Ok::<_, Rejection>(reply::html(html))
        })
        .boxed();

        // GET /status -> capture state and counters
        let status = warp::path("status")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let recorder = Arc::clone(&for_status);
                async move { Ok::<_, Rejection>(reply::json(&status_of(&recorder))) }
            })
            .boxed();

        // POST /start -> arm the capture
        let start = warp::path("start")
            .and(warp::path::end())
            .and(warp::post())
            .and_then(move || {
                let recorder = Arc::clone(&for_start);
                async move {
                    recorder.start();
                    Ok::<_, Rejection>(reply::json(&status_of(&recorder)))
                }
            })
            .boxed();

        // POST /stop -> disarm the capture
        let stop = warp::path("stop")
            .and(warp::path::end())
            .and(warp::post())
            .and_then(move || {
                let recorder = Arc::clone(&for_stop);
                async move {
                    recorder.stop();
                    Ok::<_, Rejection>(reply::json(&status_of(&recorder)))
                }
            })
            .boxed();

        // POST /clear -> drop all records (refused while armed)
        let clear = warp::path("clear")
            .and(warp::path::end())
            .and(warp::post())
            .and_then(move || {
                let recorder = Arc::clone(&for_clear);
                async move {
                    if !recorder.can_clear() {
                        let res = reply::with_status(
                            reply::json(&ApiError {
                                message: "Capture is armed; stop it before clearing".to_string(),
                            }),
                            StatusCode::CONFLICT,
                        )
                        .into_response();
                        return Ok::<_, Rejection>(res);
                    }
                    recorder.clear();
                    let res = reply::json(&status_of(&recorder)).into_response();
                    Ok::<_, Rejection>(res)
                }
            })
            .boxed();

        // POST /export -> write a CSV file and report where it went
        let export = warp::path("export")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::json::<ExportRequest>())
            .and_then(move |request: ExportRequest| {
                let recorder = Arc::clone(&for_export);
                let export_dir = export_dir.clone();
                async move {
                    if !recorder.can_export() {
                        let res = reply::with_status(
                            reply::json(&ApiError {
                                message: "Capture is armed; stop it before exporting".to_string(),
                            }),
                            StatusCode::CONFLICT,
                        )
                        .into_response();
                        return Ok::<_, Rejection>(res);
                    }

                    match run_export(&recorder, &export_dir, request.path) {
                        Ok(done) => {
                            let res = reply::json(&done).into_response();
                            Ok::<_, Rejection>(res)
                        }
                        Err(message) => {
                            warn!("export failed: {}", message);
                            let res = reply::with_status(
                                reply::json(&ApiError { message }),
                                StatusCode::INTERNAL_SERVER_ERROR,
                            )
                            .into_response();
                            Ok::<_, Rejection>(res)
                        }
                    }
                }
            })
            .boxed();

        // Compose routes
        let routes = dashboard
            .or(status)
            .or(start)
            .or(stop)
            .or(clear)
            .or(export);

        let addr: SocketAddr = SocketAddr::new(bind_addr, port);
        info!("control surface listening on http://{}/", addr);
        warp::serve(routes).run(addr).await;
    }
}

fn status_of(recorder: &Recorder) -> StatusResponse {
    let snapshot = recorder.snapshot();
    StatusResponse {
        armed: recorder.is_armed(),
        record_count: snapshot.records.len(),
        max_channel_count: snapshot.max_channel_count,
        armed_since: recorder.armed_at().map(|t| t.to_rfc3339()),
    }
}

/// Resolves the destination, creates it, and streams a snapshot into it.
/// Destination failures come back as a message for the API client; they
/// are the one failure the core surfaces.
fn run_export(
    recorder: &Recorder,
    export_dir: &Path,
    explicit: Option<PathBuf>,
) -> Result<ExportResponse, String> {
    let path = explicit.unwrap_or_else(|| {
        export_dir.join(format!("capture-{}.csv", Utc::now().format("%Y%m%d-%H%M%S")))
    });

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Cannot create {}: {}", parent.display(), e))?;
        }
    }
    let mut file =
        fs::File::create(&path).map_err(|e| format!("Cannot create {}: {}", path.display(), e))?;

    let records = recorder
        .export(&mut file)
        .map_err(|e| format!("Cannot write {}: {}", path.display(), e))?;

    info!("exported {} record(s) to {}", records, path.display());
    Ok(ExportResponse {
        path: path.display().to_string(),
        records,
    })
}
