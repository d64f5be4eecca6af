use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use shared::{
    domain::{Availability, Capability},
    protocol::WorkerMessage,
};
use worker_core::HostProfile;

use super::*;
use crate::controller::{
    orchestration::{Controller, DispatchError},
    reducer::ModelStatus,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn fast_settings() -> Settings {
    Settings {
        download_steps: 2,
        step_delay_ms: 0,
        chunk_delay_ms: 0,
        ..Settings::default()
    }
}

/// Feeds worker envelopes to the controller until `stop` matches.
fn pump_until(
    bridge: &BackendBridge,
    controller: &mut Controller,
    stop: impl Fn(&WorkerMessage) -> bool,
) -> Vec<WorkerMessage> {
    let mut seen = Vec::new();
    loop {
        let raw = bridge
            .status_receiver()
            .recv_timeout(RECV_TIMEOUT)
            .expect("worker message");
        let message = controller.handle_envelope(&raw).expect("valid envelope");
        let done = stop(&message);
        seen.push(message);
        if done {
            return seen;
        }
    }
}

#[test]
fn launched_worker_answers_a_prompt() {
    let bridge = launch(&fast_settings()).expect("launch");
    let mut controller = Controller::new(bridge.request_sender());

    let preparation = pump_until(&bridge, &mut controller, WorkerMessage::is_terminal);
    assert_eq!(preparation.first(), Some(&WorkerMessage::PreparingModel));
    assert_eq!(preparation.last(), Some(&WorkerMessage::ModelReady));
    assert!(controller.view().trigger_enabled);

    controller.submit("hello bridge").expect("submit");
    assert!(!controller.view().trigger_enabled);

    let generation = pump_until(&bridge, &mut controller, WorkerMessage::is_terminal);
    assert_eq!(
        generation,
        vec![
            WorkerMessage::GeneratingResponse,
            WorkerMessage::ResponseReady("You said: hello bridge".into()),
        ]
    );
    assert_eq!(controller.view().status, ModelStatus::Ready);
    assert!(controller.view().trigger_enabled);
    assert_eq!(
        controller.view().output.as_deref(),
        Some("You said: hello bridge")
    );
}

#[test]
fn failed_preparation_leaves_trigger_disabled() {
    let settings = Settings {
        fail_preparation: true,
        ..fast_settings()
    };
    let bridge = launch(&settings).expect("launch");
    let mut controller = Controller::new(bridge.request_sender());

    let preparation = pump_until(&bridge, &mut controller, WorkerMessage::is_terminal);
    assert_eq!(preparation.last(), Some(&WorkerMessage::ModelError));
    assert_eq!(controller.view().status, ModelStatus::Error);
    assert!(!controller.view().trigger_enabled);

    let err = controller.submit("anyone there?").expect_err("disabled");
    assert!(matches!(
        err,
        DispatchError::Busy {
            status: ModelStatus::Error
        }
    ));
}

#[test]
fn injected_host_drives_the_worker() {
    let host = Arc::new(SimulatedHost::new(
        HostProfile::instant()
            .with_availability(Capability::LanguageModel, Availability::Unavailable),
    ));
    let bridge = launch_with_host(&fast_settings(), Arc::clone(&host)).expect("launch");
    let mut controller = Controller::new(bridge.request_sender());

    let preparation = pump_until(&bridge, &mut controller, WorkerMessage::is_terminal);
    assert_eq!(
        preparation,
        vec![WorkerMessage::PreparingModel, WorkerMessage::ModelError]
    );
    assert_eq!(
        host.profile().availability.get(&Capability::LanguageModel),
        Some(&Availability::Unavailable)
    );
}

#[test]
fn dropping_the_bridge_abandons_a_slow_download() {
    let settings = Settings {
        download_steps: 30,
        step_delay_ms: 100,
        ..fast_settings()
    };
    let bridge = launch(&settings).expect("launch");
    let first = bridge
        .status_receiver()
        .recv_timeout(RECV_TIMEOUT)
        .expect("first message");
    assert_eq!(
        WorkerMessage::decode(&first).expect("valid envelope"),
        WorkerMessage::PreparingModel
    );

    let started = Instant::now();
    drop(bridge);
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "drop took {:?}",
        started.elapsed()
    );
}

#[test]
fn dropping_the_bridge_stops_an_idle_worker() {
    let bridge = launch(&fast_settings()).expect("launch");
    let mut controller = Controller::new(bridge.request_sender());
    pump_until(&bridge, &mut controller, WorkerMessage::is_terminal);

    // the controller still holds a request sender, so only shutdown ends the loop
    let started = Instant::now();
    drop(bridge);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(controller.submit("late").is_err());
}
