//! CLI for PizzaLink
//!
//! Subcommands:
//! - `broker`: run the in-memory queue broker
//! - `queue-send` / `queue-recv`: the queue path
//! - `http-send` / `http-recv`: the HMAC-protected HTTP path

use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::{Args, Parser};
use pizzalink::broker::Broker;
use pizzalink::config::{ENV_PREFIX, Settings, load_config};
use pizzalink::http::{HttpSender, ReceiverState, start_http_receiver};
use pizzalink::integrity::IntegrityCodec;
use pizzalink::order::{PizzaOrder, validate_price};
use pizzalink::queue::{QueueChannel, QueueReceiver, send_order};
use pizzalink::transport::start_broker_server;
use pizzalink::utils::{Error, Result, logging};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "pizzalink", version)]
enum Command {
    /// Start the queue broker
    Broker,
    /// Publish one pizza order to the queue
    QueueSend(OrderArgs),
    /// Consume pizza orders from the queue until Ctrl-C
    QueueRecv,
    /// POST one signed pizza order to the HTTP receiver
    HttpSend(OrderArgs),
    /// Serve the HTTP receiver until Ctrl-C
    HttpRecv,
}

/// Overrides for the order to send; unset fields keep the Pepperoni default.
#[derive(Args, Debug, Default)]
struct OrderArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    size: Option<String>,
    #[arg(long, value_parser = parse_price)]
    price: Option<f64>,
    /// Repeat to list several toppings
    #[arg(long = "topping")]
    toppings: Vec<String>,
}

fn parse_price(value: &str) -> std::result::Result<f64, String> {
    let price: f64 = value.parse().map_err(|e| format!("{e}"))?;
    validate_price(price).map_err(|e| e.to_string())
}

impl OrderArgs {
    fn into_order(self) -> Result<PizzaOrder> {
        let base = PizzaOrder::pepperoni();
        let toppings = if self.toppings.is_empty() {
            base.toppings
        } else {
            self.toppings
        };
        Ok(PizzaOrder::new(
            self.name.unwrap_or(base.name),
            self.size.unwrap_or(base.size),
            self.price.unwrap_or(base.price),
            toppings,
        )?)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.log.level);
    if settings.uses_default_secret() {
        warn!(
            "Using the built-in shared secret; set {}_INTEGRITY__SHARED_SECRET outside local runs",
            ENV_PREFIX
        );
    }

    let result = match cmd {
        Command::Broker => run_broker(&settings).await,
        Command::QueueSend(args) => run_queue_send(&settings, args).await,
        Command::QueueRecv => run_queue_recv(&settings).await,
        Command::HttpSend(args) => run_http_send(&settings, args).await,
        Command::HttpRecv => run_http_recv(&settings).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_broker(settings: &Settings) -> Result<()> {
    let addr = settings.broker.addr();
    let broker = Arc::new(Mutex::new(Broker::new()));

    tokio::select! {
        result = start_broker_server(&addr, broker) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            Ok(())
        }
    }
}

async fn run_queue_send(settings: &Settings, args: OrderArgs) -> Result<()> {
    let order = args.into_order()?;
    let mut channel = QueueChannel::connect(&settings.broker.url(), settings.queue.prefetch).await?;
    send_order(&mut channel, &settings.queue.name, &order).await?;
    channel.close().await
}

async fn run_queue_recv(settings: &Settings) -> Result<()> {
    let mut channel = QueueChannel::connect(&settings.broker.url(), settings.queue.prefetch).await?;
    let mut consumer = QueueReceiver::subscribe(&mut channel, &settings.queue.name).await?;
    let receiver = QueueReceiver::from_settings(&settings.queue);

    tokio::select! {
        _ = receiver.run(&mut consumer, |_| {}) => {
            warn!("Broker connection closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    channel.close().await
}

async fn run_http_send(settings: &Settings, args: OrderArgs) -> Result<()> {
    let order = args.into_order()?;
    let codec = IntegrityCodec::new(&settings.integrity.shared_secret)?;
    let sender = HttpSender::new(&settings.http, codec)?;
    info!(url = sender.url(), %order, "Sending pizza order");

    let outcome = sender.send(&order).await?;
    if outcome.is_success() {
        Ok(())
    } else {
        Err(Error::Protocol(format!(
            "receiver answered {}: {}",
            outcome.status, outcome.body
        )))
    }
}

async fn run_http_recv(settings: &Settings) -> Result<()> {
    let codec = IntegrityCodec::new(&settings.integrity.shared_secret)?;
    let state = ReceiverState::from_settings(&settings.http, codec);
    start_http_receiver(&settings.http, state).await
}
