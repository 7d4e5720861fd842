use std::convert::Infallible;

use actix_web::{
    delete, get,
    http::{header, StatusCode},
    patch, post, put, web, HttpRequest, HttpResponse, ResponseError,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::client::SplitClient;
use crate::error::Error;
use crate::realtime::{RealtimeEvent, RealtimeHub};
use crate::schemas::{
    BillDraft, BillId, ErrorReport, GroupId, GroupPatch, ImportedBackup, Member, MemberId,
    NewGroup, NewGroupInfo,
};

pub struct AppState {
    pub client: SplitClient,
    pub hub: RealtimeHub,
}

impl AppState {
    pub fn new(client: SplitClient) -> Self {
        AppState {
            client,
            hub: RealtimeHub::new(),
        }
    }

    fn notify(&self, group_id: &str, event: RealtimeEvent) {
        self.hub.channel(group_id).send(event);
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::MemberReferenced(_) => StatusCode::CONFLICT,
            Error::NotFound(_) | Error::MemberNotFound { .. } => StatusCode::NOT_FOUND,
            Error::Remote(err) if err.is_missing() => StatusCode::NOT_FOUND,
            Error::Remote(_) => StatusCode::BAD_GATEWAY,
            Error::Cascade { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        HttpResponse::build(status).body(self.to_string())
    }
}

type Response = Result<HttpResponse, Error>;

#[derive(Deserialize)]
struct GroupIdsQuery {
    #[serde(default)]
    ids: String,
}

#[get("/groups")]
async fn fetch_groups(state: web::Data<AppState>, query: web::Query<GroupIdsQuery>) -> HttpResponse {
    let ids: Vec<GroupId> = query
        .ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    HttpResponse::Ok().json(state.client.fetch_groups(&ids).await)
}

#[post("/groups")]
async fn create_group(state: web::Data<AppState>, json: web::Json<NewGroup>) -> Response {
    state.client.create_group(json.into_inner()).await?;
    Ok(HttpResponse::Created().body("Group created"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportRequest {
    imported: ImportedBackup,
    new_group_info: NewGroupInfo,
}

#[post("/groups/import")]
async fn import_group(state: web::Data<AppState>, json: web::Json<ImportRequest>) -> Response {
    let ImportRequest {
        imported,
        new_group_info,
    } = json.into_inner();
    state.client.import_group(imported, new_group_info).await?;
    Ok(HttpResponse::Created().body("Group imported"))
}

#[get("/groups/{id}")]
async fn fetch_group(state: web::Data<AppState>, id: web::Path<GroupId>) -> Response {
    let group = state.client.fetch_group(&id).await?;
    Ok(HttpResponse::Ok().json(group))
}

#[patch("/groups/{id}")]
async fn update_group(
    state: web::Data<AppState>,
    id: web::Path<GroupId>,
    json: web::Json<GroupPatch>,
) -> Response {
    state.client.update_group(&id, &json).await?;
    if !json.is_empty() {
        state.notify(&id, RealtimeEvent::GroupUpdated);
    }
    Ok(HttpResponse::Ok().body("Group updated"))
}

#[delete("/groups/{id}")]
async fn delete_group(state: web::Data<AppState>, id: web::Path<GroupId>) -> Response {
    state.client.delete_group(&id).await?;
    state.notify(&id, RealtimeEvent::GroupUpdated);
    Ok(HttpResponse::Ok().body("Group deleted"))
}

#[post("/groups/{id}/members")]
async fn add_member(
    state: web::Data<AppState>,
    id: web::Path<GroupId>,
    member: web::Json<Member>,
) -> Response {
    state.client.add_member(&id, member.into_inner()).await?;
    state.notify(&id, RealtimeEvent::GroupUpdated);
    Ok(HttpResponse::Ok().body("Member added"))
}

#[put("/groups/{id}/members/{member_id}")]
async fn update_member(
    state: web::Data<AppState>,
    path: web::Path<(GroupId, MemberId)>,
    member: web::Json<Member>,
) -> Response {
    let (id, member_id) = path.into_inner();
    let member = Member {
        id: member_id,
        ..member.into_inner()
    };
    state.client.update_member(&id, member).await?;
    state.notify(&id, RealtimeEvent::GroupUpdated);
    Ok(HttpResponse::Ok().body("Member updated"))
}

#[delete("/groups/{id}/members/{member_id}")]
async fn remove_member(
    state: web::Data<AppState>,
    path: web::Path<(GroupId, MemberId)>,
) -> Response {
    let (id, member_id) = path.into_inner();
    state.client.remove_member(&id, &member_id).await?;
    state.notify(&id, RealtimeEvent::GroupUpdated);
    Ok(HttpResponse::Ok().body("Member removed"))
}

#[get("/groups/{id}/bills")]
async fn fetch_bills(state: web::Data<AppState>, id: web::Path<GroupId>) -> Response {
    let bills = state.client.fetch_bills(&id).await?;
    Ok(HttpResponse::Ok().json(bills))
}

#[post("/groups/{id}/bills")]
async fn create_bill(
    state: web::Data<AppState>,
    id: web::Path<GroupId>,
    draft: web::Json<BillDraft>,
) -> Response {
    let draft = BillDraft {
        group_id: id.into_inner(),
        ..draft.into_inner()
    };
    let bill = state.client.create_bill(draft).await?;
    state.notify(&bill.group_id, RealtimeEvent::BillUpdated);
    Ok(HttpResponse::Created().json(bill))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkPaidRequest {
    member_id: MemberId,
    bill_ids: Vec<BillId>,
}

#[post("/groups/{id}/bills/paid")]
async fn mark_bills_as_paid(
    state: web::Data<AppState>,
    id: web::Path<GroupId>,
    json: web::Json<MarkPaidRequest>,
) -> Response {
    state
        .client
        .mark_bills_as_paid(&id, &json.member_id, &json.bill_ids)
        .await?;
    state.notify(&id, RealtimeEvent::BillUpdated);
    Ok(HttpResponse::Ok().body("Bills marked as paid"))
}

#[put("/groups/{id}/bills/{bill_id}")]
async fn update_bill(
    state: web::Data<AppState>,
    path: web::Path<(GroupId, BillId)>,
    draft: web::Json<BillDraft>,
) -> Response {
    let (id, bill_id) = path.into_inner();
    let draft = BillDraft {
        group_id: id,
        ..draft.into_inner()
    };
    state.client.update_bill(&bill_id, &draft).await?;
    state.notify(&draft.group_id, RealtimeEvent::BillUpdated);
    Ok(HttpResponse::Ok().body("Bill updated"))
}

#[delete("/groups/{id}/bills/{bill_id}")]
async fn delete_bill(state: web::Data<AppState>, path: web::Path<(GroupId, BillId)>) -> Response {
    let (id, bill_id) = path.into_inner();
    state.client.delete_bill(&id, &bill_id).await?;
    state.notify(&id, RealtimeEvent::BillUpdated);
    Ok(HttpResponse::Ok().body("Bill deleted"))
}

#[delete("/groups/{id}/categories/{category_id}")]
async fn delete_category(
    state: web::Data<AppState>,
    path: web::Path<(GroupId, String)>,
) -> Response {
    let (id, category_id) = path.into_inner();
    state.client.delete_category(&id, &category_id).await?;
    state.notify(&id, RealtimeEvent::GroupUpdated);
    state.notify(&id, RealtimeEvent::BillUpdated);
    Ok(HttpResponse::Ok().body("Category deleted"))
}

#[get("/groups/{id}/events")]
async fn subscribe_events(state: web::Data<AppState>, id: web::Path<GroupId>) -> HttpResponse {
    let subscription = state.hub.subscribe(&id);
    let stream = futures::stream::unfold(subscription, |mut subscription| async move {
        let message = subscription.recv().await?;
        let data = serde_json::to_string(&message).unwrap_or_default();
        let frame = format!("event: {}\ndata: {}\n\n", message.event, data);
        Some((Ok::<_, Infallible>(web::Bytes::from(frame)), subscription))
    });
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

#[derive(Deserialize)]
struct BroadcastRequest {
    event: RealtimeEvent,
}

#[post("/groups/{id}/events")]
async fn broadcast_event(
    state: web::Data<AppState>,
    id: web::Path<GroupId>,
    json: web::Json<BroadcastRequest>,
) -> HttpResponse {
    let delivered = state.hub.channel(&id).send(json.event);
    HttpResponse::Ok().json(json!({ "delivered": delivered }))
}

#[derive(Deserialize)]
struct ErrorLogRequest {
    #[serde(default)]
    path: Option<String>,
    error: serde_json::Value,
}

#[post("/error-logs")]
async fn create_error_log(
    state: web::Data<AppState>,
    request: HttpRequest,
    json: web::Json<ErrorLogRequest>,
) -> HttpResponse {
    let header_value = |name: header::HeaderName| {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let ErrorLogRequest { path, error } = json.into_inner();
    let report = ErrorReport {
        path: path.unwrap_or_else(|| header_value(header::REFERER)),
        ua: header_value(header::USER_AGENT),
        error,
    };

    let client = state.client.clone();
    actix_web::rt::spawn(async move {
        if let Err(err) = client.create_error_log(report).await {
            warn!(error = %err, "Failed to store error log");
        }
    });
    HttpResponse::Accepted().finish()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(fetch_groups)
        .service(create_group)
        .service(import_group)
        .service(fetch_group)
        .service(update_group)
        .service(delete_group)
        .service(add_member)
        .service(update_member)
        .service(remove_member)
        .service(fetch_bills)
        .service(create_bill)
        .service(mark_bills_as_paid)
        .service(update_bill)
        .service(delete_bill)
        .service(delete_category)
        .service(subscribe_events)
        .service(broadcast_event)
        .service(create_error_log);
}
