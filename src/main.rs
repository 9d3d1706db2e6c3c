use std::collections::HashSet;
use std::iter::FromIterator;
use std::net::{Ipv4Addr, SocketAddr};

use actix::prelude::*;
use actix_http::ws::Codec;
use actix_web::{get, middleware, web, App, Error, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;
use clap::Clap;
use simple_logger::SimpleLogger;

mod aggregator;
mod chain;
mod feed;
mod location;
mod node;
mod types;
mod util;

use aggregator::{Aggregator, GetHealth, GetNetworkState};
use feed::connector::FeedConnector;
use location::{Locator, LocatorFactory};
use node::connector::NodeConnector;
use util::NodeId;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const NAME: &str = "Telemetry Aggregator";
const ABOUT: &str = "Telemetry aggregator that ingests node status reports and serves them to dashboard feeds.";

#[derive(Clap, Debug)]
#[clap(name = NAME, version = VERSION, author = AUTHORS, about = ABOUT)]
struct Opts {
    #[clap(
        long = "ingest-listen",
        env = "TELEMETRY_INGEST_LISTEN",
        default_value = "127.0.0.1:8000",
        about = "Socket address nodes connect to for `/submit`."
    )]
    ingest_socket: SocketAddr,
    #[clap(
        long = "feed-listen",
        env = "TELEMETRY_FEED_LISTEN",
        default_value = "127.0.0.1:8001",
        about = "Socket address dashboard feeds connect to for `/feed`."
    )]
    feed_socket: SocketAddr,
    #[clap(
        long = "sidecar-listen",
        env = "TELEMETRY_SIDECAR_LISTEN",
        default_value = "127.0.0.1:8002",
        about = "Socket address the HTTP sidecar (`/health`, `/network_state/...`) listens on."
    )]
    sidecar_socket: SocketAddr,
    #[clap(
        required = false,
        long = "denylist",
        env = "TELEMETRY_DENYLIST",
        about = "Space delimited list of chains that are not allowed to connect to telemetry. Case sensitive."
    )]
    denylist: Vec<String>,
    #[clap(
        arg_enum,
        required = false,
        long = "log",
        env = "TELEMETRY_LOG",
        default_value = "info",
        about = "Log level."
    )]
    log_level: LogLevel,
}

#[derive(Clap, Debug, PartialEq)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<&LogLevel> for log::LevelFilter {
    fn from(log_level: &LogLevel) -> Self {
        match log_level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Entry point for connecting nodes
#[get("/submit")]
async fn node_route(
    req: HttpRequest,
    stream: web::Payload,
    aggregator: web::Data<Addr<Aggregator>>,
    locator: web::Data<Addr<Locator>>,
) -> Result<HttpResponse, Error> {
    let ip = req
        .connection_info()
        .realip_remote_addr()
        .and_then(|mut addr| {
            if let Some(port_idx) = addr.find(':') {
                addr = &addr[..port_idx];
            }
            addr.parse::<Ipv4Addr>().ok()
        });

    let mut res = ws::handshake(&req)?;
    let aggregator = aggregator.get_ref().clone();
    let locator = locator.get_ref().clone().recipient();

    Ok(res.streaming(ws::WebsocketContext::with_codec(
        NodeConnector::new(aggregator, locator, ip),
        stream,
        Codec::new().max_size(10 * 1024 * 1024), // 10mb frame limit
    )))
}

/// Entry point for connecting feeds
#[get("/feed")]
async fn feed_route(
    req: HttpRequest,
    stream: web::Payload,
    aggregator: web::Data<Addr<Aggregator>>,
) -> Result<HttpResponse, Error> {
    ws::start(
        FeedConnector::new(aggregator.get_ref().clone()),
        &req,
        stream,
    )
}

/// Entry point for health check monitoring bots
#[get("/health")]
async fn health(aggregator: web::Data<Addr<Aggregator>>) -> Result<HttpResponse, Error> {
    match aggregator.send(GetHealth).await {
        Ok(count) => {
            let body = format!("Connected chains: {}", count);

            HttpResponse::Ok().body(body).await
        }
        Err(error) => {
            log::error!("Health check mailbox error: {:?}", error);

            HttpResponse::InternalServerError().await
        }
    }
}

/// Returns the last-reported `system.network_state` blob for a node,
/// passed through untouched.
#[get("/network_state/{chain_label}/{nid}/")]
async fn network_state_route(
    aggregator: web::Data<Addr<Aggregator>>,
    path: web::Path<(String, NodeId)>,
) -> Result<HttpResponse, Error> {
    let (label, nid) = path.into_inner();

    match aggregator
        .send(GetNetworkState {
            label: label.into_boxed_str(),
            nid,
        })
        .await
    {
        Ok(Some(state)) => Ok(HttpResponse::Ok()
            .content_type("application/json")
            .body(state.get().to_owned())),
        Ok(None) => Ok(HttpResponse::NotFound().finish()),
        Err(error) => {
            log::error!("network_state mailbox error: {:?}", error);
            Ok(HttpResponse::InternalServerError().finish())
        }
    }
}

/// Telemetry entry point: three independently configurable listen
/// addresses for ingest, feed, and the HTTP sidecar.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let opts = Opts::parse();
    let log_level = &opts.log_level;
    SimpleLogger::new()
        .with_level(log_level.into())
        .init()
        .expect("Must be able to start a logger");

    let denylist = HashSet::from_iter(opts.denylist);
    let aggregator = Aggregator::new(denylist).start();
    let factory = LocatorFactory::new();
    let locator = SyncArbiter::start(4, move || factory.create());

    log::info!("Starting Telemetry Aggregator version: {}", VERSION);

    let ingest_aggregator = aggregator.clone();
    let ingest_locator = locator.clone();
    let ingest_server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::NormalizePath::default())
            .data(ingest_aggregator.clone())
            .data(ingest_locator.clone())
            .service(node_route)
    })
    .bind(opts.ingest_socket)?
    .run();

    let feed_aggregator = aggregator.clone();
    let feed_server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::NormalizePath::default())
            .data(feed_aggregator.clone())
            .service(feed_route)
    })
    .bind(opts.feed_socket)?
    .run();

    let sidecar_aggregator = aggregator.clone();
    let sidecar_server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::NormalizePath::default())
            .data(sidecar_aggregator.clone())
            .service(health)
            .service(network_state_route)
    })
    .bind(opts.sidecar_socket)?
    .run();

    futures::try_join!(ingest_server, feed_server, sidecar_server)?;

    Ok(())
}
