use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_http::ws::Item;
use actix_web_actors::ws::{self, CloseReason};
use bytes::{Bytes, BytesMut};

use crate::aggregator::{AddNode, Aggregator};
use crate::chain::{Chain, RemoveNode, UpdateNode};
use crate::location::LocateRequest;
use crate::node::message::{NodeMessage, Payload};
use crate::types::NodeId;

/// How often heartbeat pings are sent.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
/// How long before lack of any client frame causes a timeout (`TIMEOUT`).
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);
/// How long a connection has to send `system.connected` before being closed.
const HELLO_DEADLINE: Duration = Duration::from_secs(5);
/// How many pre-hello frames are buffered for replay once `LIVE`.
const HELLO_BACKLOG: usize = 10;
/// Continuation buffer limit, 10mb.
const CONT_BUF_LIMIT: usize = 10 * 1024 * 1024;

enum State {
    AwaitHello { backlog: Vec<Payload> },
    Live { nid: NodeId, chain: Addr<Chain> },
    Closed,
}

pub struct NodeConnector {
    state: State,
    /// Client must send some frame at least once every `CLIENT_TIMEOUT`.
    hb: Instant,
    aggregator: Addr<Aggregator>,
    /// IP address of the node this connector is responsible for.
    ip: Option<Ipv4Addr>,
    locator: Recipient<LocateRequest>,
    contbuf: BytesMut,
}

impl Actor for NodeConnector {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);
        self.hello_deadline(ctx);
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        if let State::Live { nid, chain } = std::mem::replace(&mut self.state, State::Closed) {
            chain.do_send(RemoveNode(nid));
        }
    }
}

impl NodeConnector {
    pub fn new(
        aggregator: Addr<Aggregator>,
        locator: Recipient<LocateRequest>,
        ip: Option<Ipv4Addr>,
    ) -> Self {
        Self {
            state: State::AwaitHello {
                backlog: Vec::new(),
            },
            hb: Instant::now(),
            aggregator,
            ip,
            locator,
            contbuf: BytesMut::new(),
        }
    }

    fn heartbeat(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                ctx.close(Some(CloseReason {
                    code: ws::CloseCode::Abnormal,
                    description: Some("Missed heartbeat".into()),
                }));
                act.state = State::Closed;
                ctx.stop();
            }
        });
    }

    fn hello_deadline(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_later(HELLO_DEADLINE, |act, ctx| {
            if matches!(act.state, State::AwaitHello { .. }) {
                ctx.close(Some(CloseReason {
                    code: ws::CloseCode::Policy,
                    description: Some("No hello received".into()),
                }));
                act.state = State::Closed;
                ctx.stop();
            }
        });
    }

    fn handle_message(&mut self, msg: NodeMessage, ctx: &mut <Self as Actor>::Context) {
        let payload = msg.into();

        match &mut self.state {
            State::Live { nid, chain } => {
                chain.do_send(UpdateNode {
                    nid: *nid,
                    payload,
                });
            }
            State::AwaitHello { backlog } => {
                if let Payload::SystemConnected(connected) = payload {
                    self.aggregator.do_send(AddNode {
                        node: connected.node,
                        genesis_hash: connected.genesis_hash,
                        node_connector: ctx.address(),
                    });
                } else {
                    if backlog.len() >= HELLO_BACKLOG {
                        backlog.remove(0);
                    }
                    backlog.push(payload);
                }
            }
            State::Closed => (),
        }
    }

    fn start_frame(&mut self, bytes: &[u8]) {
        if !self.contbuf.is_empty() {
            log::error!("Unused continuation buffer");
            self.contbuf.clear();
        }
        self.continue_frame(bytes);
    }

    fn continue_frame(&mut self, bytes: &[u8]) {
        if self.contbuf.len() + bytes.len() <= CONT_BUF_LIMIT {
            self.contbuf.extend_from_slice(bytes);
        } else {
            log::error!("Continuation buffer overflow");
            self.contbuf = BytesMut::new();
        }
    }

    fn finish_frame(&mut self) -> Bytes {
        std::mem::take(&mut self.contbuf).freeze()
    }
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Mute {
    pub reason: CloseReason,
}

impl Handler<Mute> for NodeConnector {
    type Result = ();

    fn handle(&mut self, msg: Mute, ctx: &mut Self::Context) {
        let Mute { reason } = msg;
        log::debug!(target: "NodeConnector::Mute", "Muting a node. Reason: {:?}", reason.description);

        self.state = State::Closed;
        ctx.close(Some(reason));
        ctx.stop();
    }
}

/// Sent by the Aggregator once a node has been registered with a Chain,
/// promoting this connector from `AWAIT_HELLO` to `LIVE` and replaying its
/// buffered pre-hello frames in order.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Initialize {
    pub nid: NodeId,
    pub chain: Addr<Chain>,
}

impl Handler<Initialize> for NodeConnector {
    type Result = ();

    fn handle(&mut self, msg: Initialize, _: &mut Self::Context) {
        let Initialize { nid, chain } = msg;
        log::trace!(target: "NodeConnector::Initialize", "Initializing node nid={}", nid);

        if let State::AwaitHello { backlog } = &mut self.state {
            for payload in backlog.drain(..) {
                chain.do_send(UpdateNode { nid, payload });
            }

            self.state = State::Live {
                nid,
                chain: chain.clone(),
            };
        }

        if let Some(ip) = self.ip {
            let _ = self.locator.do_send(LocateRequest { ip, nid, chain });
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for NodeConnector {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        self.hb = Instant::now();

        let data = match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
                return;
            }
            Ok(ws::Message::Pong(_)) => return,
            Ok(ws::Message::Text(text)) => text.into_bytes(),
            Ok(ws::Message::Binary(data)) => data,
            Ok(ws::Message::Close(reason)) => {
                self.state = State::Closed;
                ctx.close(reason);
                ctx.stop();
                return;
            }
            Ok(ws::Message::Nop) => return,
            Ok(ws::Message::Continuation(cont)) => match cont {
                Item::FirstText(bytes) | Item::FirstBinary(bytes) => {
                    self.start_frame(&bytes);
                    return;
                }
                Item::Continue(bytes) => {
                    self.continue_frame(&bytes);
                    return;
                }
                Item::Last(bytes) => {
                    self.continue_frame(&bytes);
                    self.finish_frame()
                }
            },
            Err(error) => {
                log::error!("{:?}", error);
                self.state = State::Closed;
                ctx.stop();
                return;
            }
        };

        match serde_json::from_slice(&data) {
            Ok(msg) => self.handle_message(msg, ctx),
            Err(err) => {
                let preview = data.get(..512).unwrap_or(&data);
                log::debug!(
                    "Failed to parse node message: {} {}",
                    err,
                    std::str::from_utf8(preview).unwrap_or("INVALID UTF8")
                );
            }
        }
    }
}
