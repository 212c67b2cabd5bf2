use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use tablelink_channel::{
    handler_fn, Channel, ChannelState, ConnectionOwner, DisplayKind, Multiplexer,
    RequestHandler, RequestHandlerGuard, SessionConfig, StateWatch, TrackerSimulator,
    TransportConfig, WINDOW_NAME,
};
use tablelink_substrate::memory::{
    MemoryBluetooth, MemoryBrowser, MemoryPresentation, MemoryPresentationService,
};
use tablelink_wire::{
    expected_response_name, request_name, response_name, DisplaySceneRequest, GetAssetRequest,
    GetAssetResponse, GetCurrentSceneResponse, GetTableConfigurationResponse, MarkerLocations,
    Request, Resolution, Response, TrackerStartCalibrationRequest, TrackerStartTrackingRequest,
    Vector2D,
};
use tracing::{info, warn};

use crate::cmd::{parse_timeout, LoopbackArgs};
use crate::exit::{channel_error, io_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, TIMEOUT};
use crate::output::{print_json, OutputFormat};

const ORIGIN: &str = "https://tablelink.local";
const TRACKER_NAME: &str = "table-camera-loopback";

#[derive(Serialize)]
struct Exchange {
    channel: &'static str,
    request: &'static str,
    response: &'static str,
    matched: bool,
    latency_ms: f64,
}

#[derive(Serialize)]
struct LoopbackReport {
    display: &'static str,
    tracker: bool,
    iterations: u32,
    exchanges: Vec<Exchange>,
    ok: bool,
}

pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    let report = runtime.block_on(exchange(&args, timeout))?;

    print_report(&report, format);
    Ok(if report.ok { SUCCESS } else { FAILURE })
}

async fn exchange(args: &LoopbackArgs, timeout: Duration) -> CliResult<LoopbackReport> {
    let kind = DisplayKind::from(args.display);
    let browser = MemoryBrowser::new(ORIGIN);
    let presentation = MemoryPresentationService::new();
    presentation.set_available(true);
    let bluetooth = MemoryBluetooth::new();
    let config = TransportConfig {
        session: SessionConfig::default().with_availability_timeout(timeout),
        ..Default::default()
    };

    let owner = ConnectionOwner::new();
    let controller = owner
        .install(Multiplexer::with_substrates(
            Arc::new(presentation.controller()),
            Arc::new(browser.main_window()),
            Arc::new(bluetooth.clone()),
            config.clone(),
        ))
        .await;
    controller.use_channel(kind).await;
    let mut controller_state = StateWatch::new(controller.as_ref());
    controller
        .connect()
        .await
        .map_err(|err| channel_error("controller connect failed", err))?;

    let display = display_surface(kind, &browser, &presentation, config)?;
    let _display_handler = RequestHandlerGuard::new(&display, display_handler());
    display
        .connect()
        .await
        .map_err(|err| channel_error("display connect failed", err))?;

    tokio::time::timeout(timeout, controller_state.wait_for(ChannelState::Connected))
        .await
        .map_err(|_| CliError::new(TIMEOUT, format!("display did not answer within {timeout:?}")))?;
    info!(display = %kind, "controller and display connected");

    let mut exchanges = Vec::new();
    for _ in 0..args.iterations {
        for request in display_requests() {
            exchanges.push(timed(controller.as_ref(), "display", request, timeout).await?);
        }
    }

    if args.tracker {
        let simulator = TrackerSimulator::new(TRACKER_NAME);
        bluetooth.add_peripheral(simulator.peripheral());
        simulator
            .start()
            .map_err(|err| channel_error("tracker simulator failed", err))?;
        simulator.set_markers(demo_markers());

        let tracker = controller.tracker();
        tracker
            .connect()
            .await
            .map_err(|err| channel_error("tracker connect failed", err))?;
        let _updates = RequestHandlerGuard::new(
            tracker.as_ref(),
            handler_fn(|request| {
                Ok(matches!(request, Request::TrackerUpdateMarkerLocations(_))
                    .then(Response::ack))
            }),
        );
        info!(tracker = TRACKER_NAME, "tracker connected");

        for _ in 0..args.iterations {
            for request in tracker_requests() {
                exchanges.push(timed(tracker.as_ref(), "tracker", request, timeout).await?);
            }
            exchanges.push(pushed_update(&simulator, timeout).await?);
        }
    }

    owner.shutdown().await;
    display.shutdown().await;

    let ok = exchanges.iter().all(|exchange| exchange.matched);
    Ok(LoopbackReport {
        display: kind.as_str(),
        tracker: args.tracker,
        iterations: args.iterations,
        exchanges,
        ok,
    })
}

/// The display end, built the way a display context would find itself.
fn display_surface(
    kind: DisplayKind,
    browser: &MemoryBrowser,
    presentation: &MemoryPresentationService,
    config: TransportConfig,
) -> CliResult<Multiplexer> {
    let display = match kind {
        DisplayKind::Window => {
            let window = browser
                .window_named(WINDOW_NAME)
                .ok_or_else(|| CliError::new(INTERNAL, "display window was not opened"))?;
            Multiplexer::with_substrates(
                Arc::new(MemoryPresentation::unsupported()),
                Arc::new(window),
                Arc::new(MemoryBluetooth::new()),
                config,
            )
        }
        DisplayKind::Session => Multiplexer::with_substrates(
            Arc::new(presentation.receiver()),
            Arc::new(MemoryBrowser::new(ORIGIN).main_window()),
            Arc::new(MemoryBluetooth::new()),
            config,
        ),
    };
    if display.current() != Some(kind) {
        return Err(CliError::new(
            INTERNAL,
            format!("display surface did not select the {kind} transport"),
        ));
    }
    Ok(display)
}

/// A table display: fixed configuration, assets echoed by id, and the last
/// scene it was shown.
fn display_handler() -> Arc<dyn RequestHandler> {
    let scene: Mutex<Option<Bytes>> = Mutex::new(None);
    handler_fn(move |request| {
        let mut scene = scene.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(match request {
            Request::GetTableConfiguration(_) => {
                Some(Response::GetTableConfiguration(GetTableConfigurationResponse {
                    resolution: Some(Resolution {
                        width: 1920,
                        height: 1080,
                    }),
                    size: 32.0,
                    play_audio_on_table: false,
                }))
            }
            Request::GetAsset(get) => Some(Response::GetAsset(GetAssetResponse {
                id: get.id.clone(),
                payload: Bytes::from(format!("asset {}", get.id)),
                media_type: "text/plain".to_string(),
            })),
            Request::DisplayScene(display) => {
                *scene = display.scene.clone();
                Some(Response::ack())
            }
            Request::GetCurrentScene(_) => Some(Response::GetCurrentScene(
                GetCurrentSceneResponse {
                    scene: scene.clone(),
                },
            )),
            _ => None,
        })
    })
}

fn display_requests() -> Vec<Request> {
    vec![
        Request::hello(),
        Request::GetTableConfiguration(Default::default()),
        Request::GetAsset(GetAssetRequest {
            id: "demo-map".to_string(),
        }),
        Request::DisplayScene(DisplaySceneRequest {
            scene: Some(Bytes::from_static(b"{\"layers\":[]}")),
        }),
        Request::GetCurrentScene(Default::default()),
    ]
}

fn tracker_requests() -> Vec<Request> {
    vec![
        Request::TrackerGetStatus(Default::default()),
        Request::TrackerStartCalibration(TrackerStartCalibrationRequest {
            corners: vec![
                Vector2D { x: 0.0, y: 0.0 },
                Vector2D { x: 0.0, y: 1.0 },
                Vector2D { x: 1.0, y: 1.0 },
                Vector2D { x: 1.0, y: 0.0 },
            ],
        }),
        Request::TrackerGetCalibration(Default::default()),
        Request::TrackerStartTracking(TrackerStartTrackingRequest { update_rate_ms: 100 }),
        Request::TrackerGetMarkerLocations(Default::default()),
        Request::TrackerSetIdle(Default::default()),
    ]
}

fn demo_markers() -> MarkerLocations {
    let mut markers = MarkerLocations::new();
    markers.insert(1, Vector2D { x: 0.25, y: 0.5 });
    markers.insert(2, Vector2D { x: 0.75, y: 0.5 });
    markers
}

async fn timed(
    channel: &dyn Channel,
    label: &'static str,
    request: Request,
    timeout: Duration,
) -> CliResult<Exchange> {
    let name = request_name(&request);
    let expected = expected_response_name(&request);
    let started = Instant::now();
    let response = channel
        .request_with_timeout(request, timeout)
        .await
        .map_err(|err| channel_error(&format!("{name} failed"), err))?;
    Ok(record(label, name, expected, &response, started.elapsed()))
}

/// The tracker pushes its markers; the controller acknowledges.
async fn pushed_update(simulator: &TrackerSimulator, timeout: Duration) -> CliResult<Exchange> {
    let started = Instant::now();
    let response = tokio::time::timeout(timeout, simulator.push_marker_update())
        .await
        .map_err(|_| CliError::new(TIMEOUT, "marker update was not acknowledged"))?
        .map_err(|err| channel_error("marker update failed", err))?;
    Ok(record(
        "tracker",
        "tracker_update_marker_locations",
        "ack",
        &response,
        started.elapsed(),
    ))
}

fn record(
    channel: &'static str,
    request: &'static str,
    expected: &'static str,
    response: &Response,
    latency: Duration,
) -> Exchange {
    let response = response_name(response);
    let matched = response == expected;
    if !matched {
        warn!(channel, request, expected, response, "unexpected response case");
    }
    Exchange {
        channel,
        request,
        response,
        matched,
        latency_ms: (latency.as_secs_f64() * 1000.0 * 100.0).round() / 100.0,
    }
}

fn print_report(report: &LoopbackReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "REQUEST", "RESPONSE", "LATENCY"]);
            for exchange in &report.exchanges {
                table.add_row(vec![
                    exchange.channel.to_string(),
                    exchange.request.to_string(),
                    exchange.response.to_string(),
                    format!("{:.2}ms", exchange.latency_ms),
                ]);
            }
            println!("{table}");
            println!("{}", summary(report));
        }
        OutputFormat::Pretty => {
            for exchange in &report.exchanges {
                println!(
                    "{} {} -> {} {:.2}ms",
                    exchange.channel, exchange.request, exchange.response, exchange.latency_ms
                );
            }
            println!("{}", summary(report));
        }
    }
}

fn summary(report: &LoopbackReport) -> String {
    let mismatched = report.exchanges.iter().filter(|e| !e.matched).count();
    if mismatched == 0 {
        format!(
            "{} exchanges over the {} display, all answered as expected",
            report.exchanges.len(),
            report.display
        )
    } else {
        format!(
            "{} of {} exchanges over the {} display got an unexpected response",
            mismatched,
            report.exchanges.len(),
            report.display
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::DisplayArg;

    fn args(display: DisplayArg, tracker: bool) -> LoopbackArgs {
        LoopbackArgs {
            display,
            tracker,
            iterations: 2,
            timeout: "5s".to_string(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn window_loopback_matches_every_response() {
        let report = exchange(&args(DisplayArg::Window, false), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(report.ok);
        assert_eq!(report.exchanges.len(), 2 * display_requests().len());
        assert!(report
            .exchanges
            .iter()
            .any(|e| e.request == "get_current_scene" && e.response == "get_current_scene"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn session_loopback_with_tracker() {
        let report = exchange(&args(DisplayArg::Session, true), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(report.ok);
        assert_eq!(report.display, "session");
        assert_eq!(
            report.exchanges.len(),
            2 * (display_requests().len() + tracker_requests().len() + 1)
        );
    }
}
