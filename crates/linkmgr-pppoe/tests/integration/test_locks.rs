//! Keep-awake locks through the service API

use std::{sync::atomic::Ordering, time::Duration};

use linkmgr_core::{
    domain::{Uid, WorkSource},
    ports::Permission,
};
use linkmgr_pppoe::{LinkError, OwnerBinding};

use crate::common::{app, settle, HarnessBuilder, APP_UID};

#[tokio::test(start_paused = true)]
async fn fifty_first_lock_is_refused() {
    let h = HarnessBuilder::new().start().await;
    let owner = OwnerBinding::new();

    let mut held = Vec::new();
    for i in 0..50 {
        let tag = format!("lock-{i}");
        held.push(h.service.acquire_lock(&app(), &owner, &tag, true, None).unwrap());
    }
    assert_eq!(h.service.registry().active_count(), 50);

    let err = h
        .service
        .acquire_lock(&app(), &owner, "one-too-many", true, None)
        .unwrap_err();
    assert_eq!(err, LinkError::ResourceExhausted { max: 50 });
    assert_eq!(h.service.registry().active_count(), 50);

    // Releasing one makes room again.
    h.service.release_lock(&app(), &held[0]).unwrap();
    assert!(h
        .service
        .acquire_lock(&app(), &owner, "fits-now", true, None)
        .is_ok());
    assert_eq!(h.service.registry().active_count(), 50);
}

#[tokio::test(start_paused = true)]
async fn released_lock_cannot_change_attribution() {
    let h = HarnessBuilder::new().start().await;
    let owner = OwnerBinding::new();
    let lock = h
        .service
        .acquire_lock(&app(), &owner, "short", false, None)
        .unwrap();
    h.service.release_lock(&app(), &lock).unwrap();

    let err = h
        .service
        .update_lock_work_source(&app(), &lock, None)
        .unwrap_err();
    assert_eq!(err, LinkError::InvariantViolation("lock not active".into()));

    // A release beyond the acquire count is refused.
    assert!(matches!(
        h.service.release_lock(&app(), &lock),
        Err(LinkError::InvariantViolation(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn attribution_updates_reach_the_wakelock_while_idle() {
    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.props.connected();
    h.enable().await;

    let owner = OwnerBinding::new();
    let lock = h
        .service
        .acquire_lock(&app(), &owner, "sync", true, None)
        .unwrap();
    h.service.screen_off().unwrap();
    tokio::time::sleep(Duration::from_secs(15 * 60 + 1)).await;

    h.access.grant(APP_UID, &[Permission::UpdateDeviceStats]);
    let ws: WorkSource = [Uid::new(42)].into_iter().collect();
    h.service
        .update_lock_work_source(&app(), &lock, Some(ws))
        .unwrap();
    settle().await;

    let calls = h.wakelock.calls();
    assert!(calls.contains(&"ws *pppoe* [10050]".to_string()));
    assert_eq!(calls.last().map(String::as_str), Some("ws *pppoe* [42]"));
}

#[tokio::test(start_paused = true)]
async fn dropped_owner_releases_its_locks() {
    let h = HarnessBuilder::new().account("user", "secret").start().await;
    h.props.connected();
    h.enable().await;

    let owner = OwnerBinding::new();
    let survivor = OwnerBinding::new();
    let _a = h
        .service
        .acquire_lock(&app(), &owner, "a", true, None)
        .unwrap();
    let _b = h
        .service
        .acquire_lock(&app(), &owner, "b", false, None)
        .unwrap();
    let _c = h
        .service
        .acquire_lock(&app(), &survivor, "c", true, None)
        .unwrap();
    assert_eq!(h.service.registry().active_count(), 3);

    drop(owner);
    assert_eq!(h.service.registry().reap_dead_owners(), 2);
    assert_eq!(h.service.registry().active_count(), 1);

    assert_eq!(h.service.registry().owner_died(survivor.id()), 1);
    assert!(!h.service.registry().has_locks());

    // With the device idle and no locks left, the link goes down.
    h.service.screen_off().unwrap();
    tokio::time::sleep(Duration::from_secs(15 * 60 + 1)).await;
    assert_eq!(h.session.stops.load(Ordering::SeqCst), 1);
}
