use std::time::Duration;

use pizzalink::config::{HttpSettings, Settings};
use pizzalink::http::{HttpSender, ReceiverState, router, serve};
use pizzalink::integrity::{IntegrityCodec, decode_mac, encode_mac};
use pizzalink::order::{OrderTransform, PizzaOrder, ProcessedOrder};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const SECRET: &str = "shared_secret_key";

struct Running {
    settings: HttpSettings,
    events: broadcast::Receiver<ProcessedOrder>,
    stop: oneshot::Sender<()>,
    server: JoinHandle<pizzalink::utils::Result<()>>,
}

impl Running {
    async fn stop(self) {
        let _ = self.stop.send(());
        self.server.await.unwrap().unwrap();
    }
}

async fn start_receiver(transform: OrderTransform) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut settings = Settings::default().http;
    settings.port = listener.local_addr().unwrap().port();

    let state = ReceiverState::new(IntegrityCodec::new(SECRET).unwrap(), transform);
    let events = state.subscribe();
    let (stop, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, router(state, &settings), async {
        let _ = stop_rx.await;
    }));

    Running {
        settings,
        events,
        stop,
        server,
    }
}

#[tokio::test]
async fn valid_order_is_accepted_and_replaced() {
    let mut running = start_receiver(OrderTransform::http_demo()).await;
    let sender = HttpSender::new(&running.settings, IntegrityCodec::new(SECRET).unwrap()).unwrap();

    let outcome = sender.send(&PizzaOrder::pepperoni()).await.unwrap();
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.body, "Pizza order received!");

    let processed = timeout(Duration::from_secs(5), running.events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(processed.received, PizzaOrder::pepperoni());
    assert_eq!(
        processed.updated,
        PizzaOrder::new("Hawaiian", "Large", 16.99, ["Pineapple", "Ham", "Bacon"]).unwrap()
    );

    running.stop().await;
}

#[tokio::test]
async fn altered_mac_is_rejected_without_processing() {
    let mut running = start_receiver(OrderTransform::http_demo()).await;
    let codec = IntegrityCodec::new(SECRET).unwrap();
    let payload = PizzaOrder::pepperoni().to_json().unwrap();

    let mut mac = decode_mac(&codec.sign(payload.as_bytes()).unwrap()).unwrap();
    let last = mac.len() - 1;
    mac[last] ^= 0x01;

    let response = reqwest::Client::new()
        .post(running.settings.url())
        .header("Content-Type", "application/json")
        .header("HMAC", encode_mac(&mac))
        .body(payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
    assert_eq!(response.text().await.unwrap(), "HMAC verification failed.");
    assert!(running.events.try_recv().is_err());

    running.stop().await;
}

#[tokio::test]
async fn get_is_answered_with_405() {
    let running = start_receiver(OrderTransform::http_demo()).await;

    let response = reqwest::get(running.settings.url()).await.unwrap();
    assert_eq!(response.status().as_u16(), 405);
    assert_eq!(response.text().await.unwrap(), "Handle POST.");

    running.stop().await;
}

#[tokio::test]
async fn concurrent_orders_are_each_processed() {
    let mut running = start_receiver(OrderTransform::Identity).await;
    let sender = HttpSender::new(&running.settings, IntegrityCodec::new(SECRET).unwrap()).unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let sender = sender.clone();
        tasks.push(tokio::spawn(async move {
            let order =
                PizzaOrder::new(format!("Pizza {i}"), "Small", 5.0 + i as f64, ["Cheese"]).unwrap();
            sender.send(&order).await.unwrap()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().status, 200);
    }

    let mut names = Vec::new();
    for _ in 0..8 {
        let processed = timeout(Duration::from_secs(5), running.events.recv())
            .await
            .unwrap()
            .unwrap();
        names.push(processed.updated.name);
    }
    names.sort();
    let mut expected: Vec<String> = (0..8).map(|i| format!("Pizza {i}")).collect();
    expected.sort();
    assert_eq!(names, expected);

    running.stop().await;
}
