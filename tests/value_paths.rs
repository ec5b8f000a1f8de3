use async_trait::async_trait;
use bytes::Bytes;
use fleetlink::dispatch::{DispatchError, PublishError, Publisher};
use fleetlink::{IngestConfig, IngressHandler, MemoryCache, RegistrationCache, Source};
use std::sync::{Arc, Mutex};

const IDENTITY_ZERO_PROPS: &[u8] = br#"{"api_ver":2,"type":"generic","capabilities":[],"mac":"aa:bb:cc:dd:ee:ff","ip":"10.0.0.1","num_props":0}"#;

struct RecordingPublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingPublisher {
    fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
        }
    }

    fn take(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.published.lock().unwrap())
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}

async fn registered_harness() -> (Arc<MemoryCache>, IngressHandler) {
    let config = IngestConfig {
        registration_check_delay_ms: 50,
        lock_poll_interval_ms: 5,
        ..IngestConfig::default()
    };
    let cache = Arc::new(MemoryCache::with_config(&config));
    let handler = IngressHandler::new(cache.clone() as Arc<dyn RegistrationCache>, config);
    handler
        .handle_message("c1", "system/info", IDENTITY_ZERO_PROPS)
        .await;
    handler
        .handle_message("c1", "app/info", br#"{"num_props":3}"#)
        .await;
    handler
        .handle_message(
            "c1",
            "app/register/prop",
            br#"{"path":"lights/state","index":0,"type":"gmbnd_primitive","format":"B","length":1,"settable":true,"gettable":true}"#,
        )
        .await;
    handler
        .handle_message(
            "c1",
            "app/register/prop",
            br#"{"path":"lights/strip","index":1,"type":"gmbnd_led","format":"H5B","length":2,"settable":true,"gettable":true}"#,
        )
        .await;
    handler
        .handle_message(
            "c1",
            "app/register/prop",
            br#"{"path":"sensor/raw","index":2,"type":"gmbnd_primitive","format":"B","length":1,"settable":false,"gettable":true}"#,
        )
        .await;
    (cache, handler)
}

#[tokio::test]
async fn set_publishes_packed_value_on_the_set_topic() {
    let (_cache, handler) = registered_harness().await;
    let publisher = RecordingPublisher::new();

    handler
        .dispatcher()
        .set_property(
            "c1",
            Source::App,
            "lights/state",
            &serde_json::json!([7]),
            &publisher,
        )
        .await
        .unwrap();

    assert_eq!(
        publisher.take(),
        vec![("c1/app/prop/set/lights/state".to_string(), vec![0x07])]
    );
}

#[tokio::test]
async fn set_composite_packs_named_fields_in_wire_order() {
    let (_cache, handler) = registered_harness().await;
    let publisher = RecordingPublisher::new();

    handler
        .dispatcher()
        .set_property(
            "c1",
            Source::App,
            "lights/strip",
            &serde_json::json!([
                {"index": 3, "brightness": 200, "white": 0, "red": 255, "green": 16, "blue": 1}
            ]),
            &publisher,
        )
        .await
        .unwrap();

    let published = publisher.take();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "c1/app/prop/set/lights/strip");
    assert_eq!(published[0].1, vec![0x00, 0x03, 200, 0, 255, 16, 1]);
}

#[tokio::test]
async fn set_unknown_property_is_refused() {
    let (_cache, handler) = registered_harness().await;
    let publisher = RecordingPublisher::new();

    let err = handler
        .dispatcher()
        .set_property(
            "c1",
            Source::App,
            "lights/ghost",
            &serde_json::json!([1]),
            &publisher,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::PropertyUnknown { .. }));
    assert!(publisher.take().is_empty());
}

#[tokio::test]
async fn set_unknown_component_is_refused() {
    let (_cache, handler) = registered_harness().await;
    let publisher = RecordingPublisher::new();

    let err = handler
        .dispatcher()
        .set_property(
            "nobody",
            Source::App,
            "lights/state",
            &serde_json::json!([1]),
            &publisher,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::PropertyUnknown { .. }));
}

#[tokio::test]
async fn set_non_settable_property_is_refused() {
    let (_cache, handler) = registered_harness().await;
    let publisher = RecordingPublisher::new();

    let err = handler
        .dispatcher()
        .set_property(
            "c1",
            Source::App,
            "sensor/raw",
            &serde_json::json!([1]),
            &publisher,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::NotSettable { .. }));
    assert!(publisher.take().is_empty());
}

#[tokio::test]
async fn set_with_excess_values_is_refused_by_default() {
    let (_cache, handler) = registered_harness().await;
    let publisher = RecordingPublisher::new();

    let err = handler
        .dispatcher()
        .set_property(
            "c1",
            Source::App,
            "lights/state",
            &serde_json::json!([1, 2]),
            &publisher,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Codec(_)));
    assert!(publisher.take().is_empty());
}

#[tokio::test]
async fn set_value_overflowing_the_format_is_refused() {
    let (_cache, handler) = registered_harness().await;
    let publisher = RecordingPublisher::new();

    let err = handler
        .dispatcher()
        .set_property(
            "c1",
            Source::App,
            "lights/state",
            &serde_json::json!([256]),
            &publisher,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Codec(_)));
}

#[tokio::test]
async fn published_set_value_round_trips_through_the_update_path() {
    let (_cache, handler) = registered_harness().await;
    let publisher = RecordingPublisher::new();

    let input = serde_json::json!([
        {"index": 9, "brightness": 128, "white": 1, "red": 2, "green": 3, "blue": 4}
    ]);
    handler
        .dispatcher()
        .set_property("c1", Source::App, "lights/strip", &input, &publisher)
        .await
        .unwrap();
    let (_, payload) = publisher.take().pop().unwrap();

    // Feed the packed bytes back as an inbound publication.
    let formatted = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&formatted);
    handler.events().on_property_update(move |e| {
        *sink.lock().unwrap() = Some(e.formatted.clone());
    });
    handler
        .handle_message("c1", "app/prop/pub/:/lights/strip", &payload)
        .await;

    assert_eq!(formatted.lock().unwrap().take(), Some(input));
}
