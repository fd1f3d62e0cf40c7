use super::{Hub, HubContext, HubEvent, annotation, qa, session};
use crate::ServiceError;
use crate::store::CanvasStore;
use actix_web::{Error, HttpRequest, HttpResponse, get, web};
use actix_ws::Message;
use futures::StreamExt as _;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubKind {
    Session,
    Qa,
    Annotation,
}

impl HubKind {
    fn name(&self) -> &'static str {
        match self {
            HubKind::Session => "session",
            HubKind::Qa => "qa",
            HubKind::Annotation => "annotation",
        }
    }
}

pub async fn route(kind: HubKind, ctx: &HubContext, frame: &str) -> Result<(), ServiceError> {
    match kind {
        HubKind::Session => session::dispatch(ctx, frame).await,
        HubKind::Qa => qa::dispatch(ctx, frame).await,
        HubKind::Annotation => annotation::dispatch(ctx, frame).await,
    }
}

#[get("/hub/session")]
pub async fn session_hub(
    req: HttpRequest,
    body: web::Payload,
    hub: web::Data<Hub>,
    store: web::Data<CanvasStore>,
) -> Result<HttpResponse, Error> {
    serve(req, body, hub, store, HubKind::Session).await
}

#[get("/hub/qa")]
pub async fn qa_hub(
    req: HttpRequest,
    body: web::Payload,
    hub: web::Data<Hub>,
    store: web::Data<CanvasStore>,
) -> Result<HttpResponse, Error> {
    serve(req, body, hub, store, HubKind::Qa).await
}

#[get("/hub/annotation")]
pub async fn annotation_hub(
    req: HttpRequest,
    body: web::Payload,
    hub: web::Data<Hub>,
    store: web::Data<CanvasStore>,
) -> Result<HttpResponse, Error> {
    serve(req, body, hub, store, HubKind::Annotation).await
}

async fn serve(
    req: HttpRequest,
    body: web::Payload,
    hub: web::Data<Hub>,
    store: web::Data<CanvasStore>,
    kind: HubKind,
) -> Result<HttpResponse, Error> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;
    let (connection, mut outbound) = hub.connect().await;
    let ctx = HubContext {
        hub: hub.get_ref().clone(),
        store: store.get_ref().clone(),
        connection,
    };

    info!("WebSocket connection {} opened on /hub/{}", connection, kind.name());

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                Some(frame) = outbound.recv() => {
                    if session.text(frame).await.is_err() {
                        break;
                    }
                }
                msg = msg_stream.next() => {
                    match msg {
                        Some(Ok(Message::Ping(bytes))) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = route(kind, &ctx, &text).await {
                                error!("Hub {} request from {} failed: {}", kind.name(), connection, e);
                                let _ = ctx.reply(HubEvent::error("Request failed")).await;
                            }
                        }
                        Some(Ok(Message::Close(reason))) => {
                            let _ = session.close(reason).await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("WebSocket protocol error on {}: {}", connection, e);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        ctx.hub.disconnect(connection).await;
        info!("WebSocket connection {} closed", connection);
    });

    Ok(response)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(session_hub)
        .service(qa_hub)
        .service(annotation_hub);
}
