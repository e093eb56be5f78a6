//! `/ws/scan/dynamic` (alias `/ws/dynamic-scan`) and `/ws/device-alerts`:
//! live fan-out of the Store's broadcast channels to WebSocket
//! subscribers.

use actix::{Actor, AsyncContext, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use lanwarden_core::finding::Finding;
use lanwarden_core::store::DeviceAlert;

use crate::state::AppState;

struct FindingSocket {
    rx: Option<tokio::sync::broadcast::Receiver<Finding>>,
}

impl Actor for FindingSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if let Some(rx) = self.rx.take() {
            ctx.add_stream(BroadcastStream::new(rx));
        }
    }
}

impl StreamHandler<Result<Finding, BroadcastStreamRecvError>> for FindingSocket {
    fn handle(&mut self, item: Result<Finding, BroadcastStreamRecvError>, ctx: &mut Self::Context) {
        if let Ok(finding) = item {
            if let Ok(json) = serde_json::to_string(&finding) {
                ctx.text(json);
            }
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for FindingSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(m)) => ctx.pong(&m),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => {}
        }
    }
}

struct DeviceAlertSocket {
    rx: Option<tokio::sync::broadcast::Receiver<DeviceAlert>>,
}

impl Actor for DeviceAlertSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if let Some(rx) = self.rx.take() {
            ctx.add_stream(BroadcastStream::new(rx));
        }
    }
}

impl StreamHandler<Result<DeviceAlert, BroadcastStreamRecvError>> for DeviceAlertSocket {
    fn handle(&mut self, item: Result<DeviceAlert, BroadcastStreamRecvError>, ctx: &mut Self::Context) {
        if let Ok(alert) = item {
            if let Ok(json) = serde_json::to_string(&alert) {
                ctx.text(json);
            }
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for DeviceAlertSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(m)) => ctx.pong(&m),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => {}
        }
    }
}

pub async fn findings_ws(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let rx = data.store.subscribe_findings();
    ws::start(FindingSocket { rx: Some(rx) }, &req, stream)
}

pub async fn device_alerts_ws(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let rx = data.store.subscribe_device_alerts();
    ws::start(DeviceAlertSocket { rx: Some(rx) }, &req, stream)
}
