use std::convert::Infallible;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use warp::http::StatusCode;
use warp::{Filter, Reply};

use super::{websocket, AppState};
use crate::error::CoordinatorError;
use crate::session::registry::RoomRegistry;

type JsonReply = warp::reply::WithStatus<warp::reply::Json>;

#[derive(Debug, Deserialize)]
struct CreateMeetingRequest {
    host: Option<String>,
    duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EndMeetingRequest {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidateMeetingRequest {
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartAssignmentRequest {
    username: Option<String>,
    test_id: Option<i64>,
    time_limit_sec: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteAssignmentRequest {
    assignment_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    username: Option<String>,
    code: Option<String>,
}

/// All coordinator routes: meeting lifecycle, assignment timing, the
/// execution gate and the signaling WebSocket.
pub fn api(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    health_route()
        .or(create_meeting_route(state.clone()))
        .or(validate_meeting_route(state.clone()))
        .or(get_meeting_route(state.clone()))
        .or(end_meeting_route(state.clone()))
        .or(start_assignment_route(state.clone()))
        .or(complete_assignment_route(state.clone()))
        .or(execute_route(state.clone()))
        .or(signaling_route(state))
}

fn health_route() -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path!("health").and(warp::get()).map(|| {
        warp::reply::json(&json!({
            "status": "healthy",
            "service": "Exam Session Coordinator",
            "version": "1.0.0"
        }))
    })
}

fn create_meeting_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path!("meetings")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(create_meeting)
}

fn get_meeting_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path!("meetings" / String)
        .and(warp::get())
        .and(with_state(state))
        .and_then(get_meeting)
}

fn end_meeting_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path!("meetings" / String / "end")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(end_meeting)
}

fn validate_meeting_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path!("meetings" / "validate")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(validate_meeting)
}

fn start_assignment_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path!("assignments" / "start")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(start_assignment)
}

fn complete_assignment_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path!("assignments" / "complete")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(complete_assignment)
}

fn execute_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path!("execute")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(execute)
}

fn signaling_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    warp::path!("ws")
        .and(warp::ws())
        .and(with_state(state))
        .map(|ws: warp::ws::Ws, state: Arc<AppState>| {
            ws.on_upgrade(move |websocket| {
                websocket::handle_signaling_socket(websocket, state.relay.clone())
            })
        })
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn ok(body: serde_json::Value) -> JsonReply {
    warp::reply::with_status(warp::reply::json(&body), StatusCode::OK)
}

fn error_reply(e: &CoordinatorError) -> JsonReply {
    let mut body = json!({
        "error": e.wire_code(),
        "message": e.to_string(),
    });
    if let CoordinatorError::RateLimited { retry_after_secs } = e {
        body["retryAfter"] = json!(retry_after_secs);
    }
    warp::reply::with_status(warp::reply::json(&body), e.status())
}

async fn create_meeting(
    req: CreateMeetingRequest,
    state: Arc<AppState>,
) -> Result<JsonReply, Infallible> {
    let host = req.host.unwrap_or_else(|| "host".to_string());
    let duration = req.duration.unwrap_or(state.default_duration_minutes);

    Ok(match state.registry.create_room(host, duration).await {
        Ok(room) => ok(json!(room)),
        Err(e) => error_reply(&e),
    })
}

async fn get_meeting(code: String, state: Arc<AppState>) -> Result<JsonReply, Infallible> {
    Ok(match state.registry.get_room(&code).await {
        Some(room) => {
            let active = state.registry.is_active(&code).await;
            ok(json!({
                "exists": true,
                "active": active,
                "code": room.code,
                "host": room.host,
                "createdAt": room.created_at,
                "expiresAt": room.expires_at,
            }))
        }
        None => warp::reply::with_status(
            warp::reply::json(&json!({"exists": false, "active": false})),
            StatusCode::NOT_FOUND,
        ),
    })
}

async fn end_meeting(
    code: String,
    req: EndMeetingRequest,
    state: Arc<AppState>,
) -> Result<JsonReply, Infallible> {
    match state.registry.end_room(&code, req.username.as_deref()).await {
        Ok(members) => {
            // Ending and notifying are one operation; the response is not
            // sent until the broadcast has been handed to every member
            state.relay.notify_meeting_ended(&code, &members).await;
            Ok(ok(json!({"ok": true})))
        }
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn validate_meeting(
    req: ValidateMeetingRequest,
    state: Arc<AppState>,
) -> Result<JsonReply, Infallible> {
    let code = req.code.unwrap_or_default().trim().to_uppercase();

    if !RoomRegistry::is_well_formed_code(&code) {
        return Ok(warp::reply::with_status(
            warp::reply::json(&json!({"valid": false, "error": "Invalid meeting code format"})),
            StatusCode::BAD_REQUEST,
        ));
    }

    let active = state.registry.is_active(&code).await;
    Ok(match state.registry.get_room(&code).await {
        Some(room) if active => ok(json!({
            "valid": true,
            "meeting": {"code": room.code, "host": room.host, "active": true}
        })),
        _ => warp::reply::with_status(
            warp::reply::json(&json!({"valid": false, "error": "Meeting not found or inactive"})),
            StatusCode::NOT_FOUND,
        ),
    })
}

async fn start_assignment(
    req: StartAssignmentRequest,
    state: Arc<AppState>,
) -> Result<JsonReply, Infallible> {
    let username = req.username.unwrap_or_default();
    let time_limit = req.time_limit_sec.unwrap_or(0);
    if time_limit <= 0 {
        return Ok(error_reply(&CoordinatorError::invalid("timeLimitSec")));
    }

    Ok(
        match state
            .assignments
            .start(&username, req.test_id, time_limit as u64)
            .await
        {
            Ok(assignment) => ok(json!({
                "assignmentId": assignment.id,
                "startedAt": assignment.started_at,
            })),
            Err(e) => error_reply(&e),
        },
    )
}

async fn complete_assignment(
    req: CompleteAssignmentRequest,
    state: Arc<AppState>,
) -> Result<JsonReply, Infallible> {
    let Some(assignment_id) = req.assignment_id else {
        return Ok(error_reply(&CoordinatorError::invalid("assignmentId")));
    };

    Ok(match state.assignments.complete(assignment_id).await {
        Ok(()) => ok(json!({"ok": true})),
        Err(e) => error_reply(&e),
    })
}

/// The execution gate: server-side window enforcement, then integrity
/// screening, then the external sandbox. Order matters — an expired
/// window must short-circuit before anything is logged or run.
async fn execute(req: ExecuteRequest, state: Arc<AppState>) -> Result<JsonReply, Infallible> {
    let Some(username) = req.username.filter(|u| !u.is_empty()) else {
        return Ok(error_reply(&CoordinatorError::invalid("username")));
    };
    let code = req.code.unwrap_or_default();

    let window = match state.assignments.check_window(&username).await {
        Ok(window) => window,
        Err(e) => return Ok(error_reply(&e)),
    };

    if let Err(e) = state.submissions.screen(&username, &code).await {
        return Ok(error_reply(&e));
    }

    Ok(match state.sandbox.execute(&code) {
        Ok(result) => ok(json!({
            "result": result,
            "assignmentId": window.assignment.id,
            "elapsed": window.elapsed_secs,
        })),
        Err(e) => error_reply(&e),
    })
}
