//! Link state machine behavior, driven through the service and link monitor

use std::{sync::atomic::Ordering, time::Duration};

use linkmgr_core::{
    domain::{DetailedState, PppoeAccount, PppoeState, RunState},
    ports::Broadcast,
};

use crate::common::{app, settle, HarnessBuilder};

#[tokio::test(start_paused = true)]
async fn link_up_without_account_reports_no_account() {
    let h = HarnessBuilder::new().start().await;
    h.enable().await;

    assert!(h.broadcaster.pppoe_states().contains(&PppoeState::NoAccount));
    assert_eq!(h.session.start_count(), 0);
    assert_eq!(h.tracker.pppoe_state(), PppoeState::Enabled);
}

#[tokio::test(start_paused = true)]
async fn link_down_at_enable_asks_to_check_the_cable() {
    let h = HarnessBuilder::new()
        .account("user", "secret")
        .link_up(false)
        .start()
        .await;
    h.props.connected();
    h.enable().await;

    assert_eq!(h.monitor.enable_calls.load(Ordering::SeqCst), 1);
    assert!(h.broadcaster.pppoe_states().contains(&PppoeState::CheckConnect));
    assert_eq!(h.session.start_count(), 0);

    h.monitor.link("eth0", true);
    settle().await;
    assert_eq!(h.session.start_count(), 1);
    assert_eq!(h.broadcaster.detailed_states().last(), Some(&DetailedState::Connected));
}

#[tokio::test(start_paused = true)]
async fn session_is_spawned_once_across_link_ups() {
    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.props.connected();

    // Enabling with the link already up posts two link-up events.
    h.enable().await;
    assert_eq!(h.session.start_count(), 1);

    // Same credentials re-run the link-up path without a second spawn.
    h.tracker
        .set_account(PppoeAccount::new("user", "secret"))
        .unwrap();
    // An unchanged link status is ignored.
    h.monitor.link("eth0", true);
    settle().await;

    assert_eq!(h.session.start_count(), 1);
    assert_eq!(
        *h.session.starts.lock().unwrap(),
        vec!["user:secret".to_string()]
    );
    assert_eq!(h.tracker.run_state(), RunState::Running);
}

#[tokio::test(start_paused = true)]
async fn connected_is_broadcast_once_then_configuration_changed() {
    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.props.connected();
    h.enable().await;

    assert!(h.tracker.has_ip_address());
    let connected = |events: &[Broadcast]| {
        events
            .iter()
            .filter(|e| {
                **e == Broadcast::NetworkStateChanged {
                    detailed: DetailedState::Connected,
                }
            })
            .count()
    };
    assert_eq!(connected(&h.broadcaster.events()), 1);

    h.broadcaster.clear();
    h.tracker
        .set_account(PppoeAccount::new("user", "secret"))
        .unwrap();
    settle().await;

    let events = h.broadcaster.events();
    assert_eq!(connected(&events), 0);
    assert!(events.contains(&Broadcast::ConfigurationChanged {
        detailed: DetailedState::Connected
    }));
}

#[tokio::test(start_paused = true)]
async fn dns_after_exit_code_zero_is_success() {
    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.props.set("net.pppoe.ppp-exit", "0");
    h.props.connected();
    h.enable().await;

    assert!(h.tracker.has_ip_address());
    assert_eq!(h.broadcaster.detailed_states(), vec![DetailedState::Connected]);
    assert_eq!(h.session.stops.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.tracker.name_servers().await,
        vec!["10.0.0.53".to_string(), "10.0.0.54".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn waits_for_dns_then_connects() {
    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.enable().await;

    assert_eq!(h.broadcaster.detailed_states(), vec![DetailedState::Connecting]);
    assert!(h.tracker.snapshot().obtaining_ip_address);

    h.props.connected();
    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert_eq!(
        h.broadcaster.detailed_states(),
        vec![DetailedState::Connecting, DetailedState::Connected]
    );
    let snap = h.tracker.snapshot();
    assert!(snap.have_ip_address);
    assert!(!snap.obtaining_ip_address);
}

#[tokio::test(start_paused = true)]
async fn exit_codes_map_to_session_statuses() {
    let cases = [
        ("0", PppoeState::CheckConnect),
        ("16", PppoeState::ModemHungUp),
        ("19", PppoeState::AccountIncorrect),
    ];
    for (code, expected) in cases {
        let h = HarnessBuilder::new().account("user", "secret").start().await;
        h.props.set("net.pppoe.ppp-exit", code);
        h.enable().await;

        assert!(
            h.broadcaster.pppoe_states().contains(&expected),
            "exit code {code} should report {expected}"
        );
        assert_eq!(h.session.stops.load(Ordering::SeqCst), 1);
        assert_eq!(h.tracker.run_state(), RunState::Stopped);
        assert!(h.tracker.is_driver_stopped());
        assert!(h.tracker.is_any_network_disabled());
    }

    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.props.set("net.pppoe.ppp-exit", "7");
    h.enable().await;
    assert_eq!(h.broadcaster.detailed_states(), vec![DetailedState::Failed]);
}

#[tokio::test(start_paused = true)]
async fn link_down_stops_the_session() {
    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.props.connected();
    h.enable().await;
    h.broadcaster.clear();

    // Other interfaces are ignored.
    h.monitor.link("eth1", false);
    settle().await;
    assert!(h.broadcaster.events().is_empty());

    h.monitor.link("eth0", false);
    settle().await;

    assert_eq!(h.session.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.broadcaster.detailed_states(), vec![DetailedState::Disconnected]);
    assert_eq!(h.tracker.run_state(), RunState::Stopped);
    assert!(!h.tracker.snapshot().link_up);
}

#[tokio::test(start_paused = true)]
async fn new_credentials_restart_a_running_session() {
    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.props.connected();
    h.enable().await;
    assert!(h.tracker.has_ip_address());

    // The new session has not published DNS yet.
    h.props.clear();
    h.service
        .set_account(&app(), "other", "pw2")
        .await
        .unwrap();
    settle().await;

    assert_eq!(h.session.stops.load(Ordering::SeqCst), 1);
    assert_eq!(
        *h.session.starts.lock().unwrap(),
        vec!["user:secret".to_string(), "other:pw2".to_string()]
    );
    assert_eq!(h.settings.value("pppoe_username").as_deref(), Some("other"));
    assert!(!h.tracker.has_ip_address());
    assert!(h.tracker.snapshot().obtaining_ip_address);

    h.props.connected();
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert!(h.tracker.has_ip_address());
    assert!(!h.tracker.snapshot().obtaining_ip_address);
}

#[tokio::test(start_paused = true)]
async fn removing_the_account_disconnects_and_reports_no_account() {
    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.props.connected();
    h.enable().await;
    h.broadcaster.clear();

    h.service.remove_account(&app()).await.unwrap();
    settle().await;

    assert_eq!(h.session.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.broadcaster.detailed_states(), vec![DetailedState::Disconnected]);
    assert_eq!(h.broadcaster.pppoe_states(), vec![PppoeState::NoAccount]);
    assert_eq!(h.settings.value("pppoe_password").as_deref(), Some(""));
}

#[tokio::test(start_paused = true)]
async fn disconnect_then_other_target_processes_disconnect_first() {
    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.props.connected();
    h.enable().await;
    h.broadcaster.clear();

    h.monitor.remove("ppp0");
    settle().await;
    assert!(h.tracker.snapshot().disconnect_pending);
    assert!(h.broadcaster.events().is_empty());

    tokio::time::sleep(Duration::from_millis(1000)).await;
    h.monitor.add("ppp1");
    settle().await;

    assert_eq!(
        h.broadcaster.detailed_states(),
        vec![DetailedState::Disconnected, DetailedState::Connected]
    );
    assert!(!h.tracker.snapshot().disconnect_pending);

    // The cancelled deferral never fires.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.broadcaster.detailed_states().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn reconnect_to_same_target_suppresses_disconnect() {
    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.props.connected();
    h.enable().await;
    h.broadcaster.clear();

    h.monitor.remove("ppp0");
    settle().await;
    tokio::time::sleep(Duration::from_millis(2000)).await;
    h.monitor.add("ppp0");
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(h.broadcaster.events().is_empty());
    assert!(h.tracker.has_ip_address());
}

#[tokio::test(start_paused = true)]
async fn deferred_disconnect_fires_after_delay() {
    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.props.connected();
    h.enable().await;
    h.broadcaster.clear();

    h.monitor.remove("ppp0");
    settle().await;
    tokio::time::sleep(Duration::from_millis(4000)).await;
    assert!(h.broadcaster.events().is_empty());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.broadcaster.detailed_states(), vec![DetailedState::Disconnected]);
    assert!(!h.tracker.has_ip_address());
}

#[tokio::test(start_paused = true)]
async fn spawn_failure_is_broadcast_and_retried_on_screen_on() {
    let h = HarnessBuilder::new()
        .account("user", "secret")
        .failing_session()
        .start()
        .await;
    h.props.connected();
    h.enable().await;

    assert!(h.broadcaster.detailed_states().contains(&DetailedState::Failed));
    assert!(h.tracker.is_any_network_disabled());
    assert_eq!(h.session.start_count(), 0);

    h.session.fail_start.store(false, Ordering::SeqCst);
    h.service.screen_on().unwrap();
    settle().await;

    assert!(!h.tracker.is_any_network_disabled());
    assert_eq!(h.session.start_count(), 1);
    assert_eq!(h.broadcaster.detailed_states().last(), Some(&DetailedState::Connected));
}

#[tokio::test(start_paused = true)]
async fn teardown_and_reconnect() {
    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.props.connected();
    h.enable().await;

    assert!(h.service.disconnect(&app()).await.unwrap());
    settle().await;
    let snap = h.tracker.snapshot();
    assert!(snap.explicitly_disabled);
    assert_eq!(snap.run_state, RunState::Stopping);
    assert!(h.tracker.is_available());
    assert_eq!(h.session.stops.load(Ordering::SeqCst), 1);

    // A second teardown is a no-op.
    assert!(h.tracker.teardown().await.unwrap());
    assert_eq!(h.session.stops.load(Ordering::SeqCst), 1);

    assert!(h.service.reconnect(&app()).await.unwrap());
    settle().await;
    assert!(!h.tracker.snapshot().explicitly_disabled);
    assert_eq!(h.session.start_count(), 2);
    assert_eq!(h.tracker.run_state(), RunState::Running);
}

#[tokio::test(start_paused = true)]
async fn unknown_event_marks_starting() {
    let h = HarnessBuilder::new().start().await;
    h.tracker.notify_unknown().unwrap();
    settle().await;
    assert_eq!(h.tracker.run_state(), RunState::Starting);
    assert!(!h.tracker.is_driver_stopped());
}
