//! Display manager behavior against a fake daemon

use std::time::Duration;

use linkmgr_core::{
    domain::{CallerId, OperateCode},
    ports::{Broadcast, Permission},
};
use linkmgr_display::DisplayError;

use crate::common::{modes, settings_app, settle, HarnessBuilder, SERVICE_UID};

#[tokio::test(start_paused = true)]
async fn attach_keeps_an_offered_configured_mode() {
    let h = HarnessBuilder::new()
        .setting("plugged_display_2_mode", "1920x1080p-60")
        .offer(1, &["1920x1080p-60", "1280x720p-60"])
        .start()
        .await;

    h.display.daemon_event(600, 0).unwrap();
    h.display.daemon_event(600, 1).unwrap();
    settle().await;

    assert_eq!(h.display.mode(1).await.unwrap().as_deref(), Some("1920x1080p-60"));
    assert_eq!(
        h.display.mode_list(1).await.unwrap(),
        modes(&["1920x1080p-60", "1280x720p-60"])
    );
    assert_eq!(
        h.broadcaster.events(),
        vec![
            Broadcast::DisplayAttached {
                slot: 0,
                connected: true
            },
            Broadcast::DisplayPlugged { connected: true },
            Broadcast::DisplayAttached {
                slot: 1,
                connected: true
            },
        ]
    );
    assert!(h.daemon.commands().is_empty());
    assert!(h.settings.puts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn attach_downgrades_or_falls_back() {
    let h = HarnessBuilder::new()
        .setting("plugged_display_2_mode", "1920x1080p-60")
        .setting("plugged_display_3_mode", "1920x1080p-60")
        .setting("plugged_display_4_mode", "1920x1080p-60")
        .offer(1, &["1280x720p-60", "640x480p-60"])
        .offer(2, &["3840x2160p-30", "2560x1440p-75"])
        .offer(3, &["junk", "640x480p-60"])
        .start()
        .await;

    for fb in 0..4 {
        h.display.interface_connected(fb).unwrap();
    }
    settle().await;

    assert_eq!(h.display.mode(1).await.unwrap().as_deref(), Some("1280x720p-60"));
    assert_eq!(h.display.mode(2).await.unwrap().as_deref(), Some("3840x2160p-30"));
    // An unparseable offer aborts the search; the first entry is used.
    assert_eq!(h.display.mode(3).await.unwrap().as_deref(), Some("junk"));
}

#[tokio::test(start_paused = true)]
async fn unreachable_mode_list_keeps_configured_mode() {
    let h = HarnessBuilder::new()
        .setting("plugged_display_2_mode", "1280x720p-60")
        .start()
        .await;

    h.display.interface_connected(0).unwrap();
    h.display.interface_connected(7).unwrap();
    settle().await;

    assert_eq!(h.display.mode(1).await.unwrap().as_deref(), Some("1280x720p-60"));
    assert!(h.display.mode_list(1).await.unwrap().is_empty());
    assert!(h.broadcaster.events().contains(&Broadcast::DisplayAttached {
        slot: 1,
        connected: true
    }));
}

#[tokio::test(start_paused = true)]
async fn enabled_slot_follows_attach_and_detach_without_persisting() {
    let h = HarnessBuilder::new()
        .setting("plugged_display_2_enable", "1")
        .setting("plugged_display_2_mirror", "1")
        .offer(1, &["1280x720p-60"])
        .start()
        .await;

    h.display.interface_connected(0).unwrap();
    h.display.interface_connected(1).unwrap();
    settle().await;

    let commands = h.daemon.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].framebuffer, 1);
    assert!(commands[0].operate.contains(OperateCode::ENABLE));
    assert!(commands[0].mirror);
    assert_eq!(commands[0].mode.as_deref(), Some("1280x720p-60"));
    assert!(h
        .broadcaster
        .events()
        .contains(&Broadcast::HdmiAudioPlug { plugged: true }));

    h.daemon.clear();
    h.display.interface_disconnected(1).unwrap();
    settle().await;

    let commands = h.daemon.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].operate, OperateCode::DISABLE);
    let events = h.broadcaster.events();
    assert!(events.contains(&Broadcast::HdmiAudioPlug { plugged: false }));
    assert!(events.contains(&Broadcast::DisplayAttached {
        slot: 1,
        connected: false
    }));

    assert!(h.display.enabled(1).await.unwrap());
    assert!(h.settings.puts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unchanged_values_issue_no_command_and_no_write() {
    let h = HarnessBuilder::new()
        .setting("plugged_display_2_enable", "1")
        .offer(1, &["1280x720p-60"])
        .start()
        .await;
    h.display.interface_connected(0).unwrap();
    h.display.interface_connected(1).unwrap();
    settle().await;
    h.daemon.clear();

    let app = settings_app();
    h.display.set_mirror(&app, 1, false).unwrap();
    h.display.set_rotation(&app, 1, false).unwrap();
    h.display.set_overscan(&app, 1, 0).unwrap();
    h.display.set_color_depth(&app, 1, 0).unwrap();
    h.display.set_mode(&app, 1, "1280x720p-60").unwrap();
    settle().await;

    assert!(h.daemon.commands().is_empty());
    assert!(h.settings.puts().is_empty());

    h.display.set_mirror(&app, 1, true).unwrap();
    h.display.set_overscan(&app, 1, 3).unwrap();
    settle().await;

    let commands = h.daemon.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].operate, OperateCode::CHANGE | OperateCode::CHANGE_MIRROR);
    assert!(commands[0].mirror);
    assert_eq!(commands[1].operate, OperateCode::CHANGE | OperateCode::CHANGE_OVERSCAN);
    assert_eq!(commands[1].overscan, 3);
    assert_eq!(
        h.settings.puts(),
        vec![
            ("plugged_display_2_mirror".to_string(), "1".to_string()),
            ("plugged_display_2_overscan".to_string(), "3".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn enable_always_round_trips() {
    let h = HarnessBuilder::new().offer(1, &["1280x720p-60"]).start().await;
    h.display.interface_connected(0).unwrap();
    h.display.interface_connected(1).unwrap();
    settle().await;

    let app = settings_app();
    h.display.set_enable(&app, 1, true).unwrap();
    h.display.set_enable(&app, 1, true).unwrap();
    settle().await;

    let enables = h
        .daemon
        .commands()
        .into_iter()
        .filter(|c| c.operate.contains(OperateCode::ENABLE))
        .count();
    assert_eq!(enables, 2);
    assert_eq!(h.settings.value("plugged_display_2_enable").as_deref(), Some("1"));
    assert_eq!(
        h.settings.value("plugged_display_2_mode").as_deref(),
        Some("1280x720p-60")
    );
    let enable_writes = h
        .settings
        .puts()
        .into_iter()
        .filter(|(k, _)| k == "plugged_display_2_enable")
        .count();
    assert_eq!(enable_writes, 2);
}

#[tokio::test(start_paused = true)]
async fn disabled_slot_persists_without_command() {
    let h = HarnessBuilder::new().start().await;

    h.display.set_overscan(&settings_app(), 2, 5).unwrap();
    settle().await;

    assert!(h.daemon.commands().is_empty());
    assert_eq!(h.settings.value("plugged_display_3_overscan").as_deref(), Some("5"));
    assert_eq!(h.display.overscan(2).await.unwrap(), 5);
}

#[tokio::test(start_paused = true)]
async fn primary_changes_rewrite_the_config_file() {
    let h = HarnessBuilder::new().start().await;
    let app = settings_app();

    h.display.set_mode(&app, 0, "1280x720p-60").unwrap();
    settle().await;
    assert_eq!(
        std::fs::read_to_string(&h.config_file).unwrap(),
        "mode=1280x720p-60\ncolordepth=0\n"
    );

    h.display.set_color_depth(&app, 0, 32).unwrap();
    settle().await;
    assert_eq!(
        std::fs::read_to_string(&h.config_file).unwrap(),
        "mode=1280x720p-60\ncolordepth=32\n"
    );
    assert_eq!(
        h.settings.value("plugged_display_1_colordepth").as_deref(),
        Some("32")
    );

    // Other slots never touch the file.
    h.display.set_mode(&app, 1, "640x480p-60").unwrap();
    settle().await;
    assert_eq!(
        std::fs::read_to_string(&h.config_file).unwrap(),
        "mode=1280x720p-60\ncolordepth=32\n"
    );
}

#[tokio::test(start_paused = true)]
async fn primary_config_file_is_written_after_the_command() {
    let h = HarnessBuilder::new()
        .setting("plugged_display_1_enable", "1")
        .start()
        .await;
    h.display.interface_connected(0).unwrap();
    settle().await;
    h.daemon.clear();

    let app = settings_app();
    h.display.set_mode(&app, 0, "1280x720p-60").unwrap();
    settle().await;
    assert_eq!(*h.daemon.file_at_apply.lock().unwrap(), vec![None]);
    assert_eq!(
        std::fs::read_to_string(&h.config_file).unwrap(),
        "mode=1280x720p-60\ncolordepth=0\n"
    );

    h.daemon.clear();
    h.display.set_color_depth(&app, 0, 16).unwrap();
    settle().await;
    assert_eq!(
        *h.daemon.file_at_apply.lock().unwrap(),
        vec![Some("mode=1280x720p-60\ncolordepth=0\n".to_string())]
    );
    assert_eq!(
        std::fs::read_to_string(&h.config_file).unwrap(),
        "mode=1280x720p-60\ncolordepth=16\n"
    );
}

#[tokio::test(start_paused = true)]
async fn out_of_range_settings_fall_back_to_defaults() {
    let h = HarnessBuilder::new()
        .setting("plugged_display_2_colordepth", "-1")
        .setting("plugged_display_2_overscan", "4294967296")
        .setting("plugged_display_3_colordepth", "32")
        .setting("plugged_display_3_overscan", "-3")
        .start()
        .await;

    let second = h.display.settings(1).await.unwrap();
    assert_eq!(second.color_depth, 0);
    assert_eq!(second.overscan, 0);

    let third = h.display.settings(2).await.unwrap();
    assert_eq!(third.color_depth, 32);
    assert_eq!(third.overscan, -3);
}

#[tokio::test(start_paused = true)]
async fn config_file_overrides_primary_settings_at_startup() {
    let h = HarnessBuilder::new()
        .setting("plugged_display_1_mode", "640x480p-60")
        .setting("plugged_display_1_colordepth", "24")
        .setting("plugged_display_1_rotation", "1")
        .config_file("mode=1280x720p-60\ncolordepth=16\n")
        .start()
        .await;

    let primary = h.display.settings(0).await.unwrap();
    assert_eq!(primary.mode.as_deref(), Some("1280x720p-60"));
    assert_eq!(primary.color_depth, 16);
    assert!(primary.rotation);
}

#[tokio::test(start_paused = true)]
async fn unplug_is_debounced() {
    let h = HarnessBuilder::new().offer(1, &["1280x720p-60"]).start().await;
    h.display.interface_connected(0).unwrap();
    h.display.interface_connected(1).unwrap();
    settle().await;
    assert_eq!(h.broadcaster.plugged(), vec![true]);

    h.display.interface_disconnected(1).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.broadcaster.plugged(), vec![true]);
    assert!(h.display.snapshot().await.unwrap().unplug_pending);

    // Re-plugging inside the window swallows the unplug.
    h.display.interface_connected(1).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.broadcaster.plugged(), vec![true]);

    h.display.interface_disconnected(1).unwrap();
    tokio::time::sleep(Duration::from_millis(1001)).await;
    assert_eq!(h.broadcaster.plugged(), vec![true, false]);
    assert!(!h.display.snapshot().await.unwrap().plugged);
}

#[tokio::test(start_paused = true)]
async fn unplug_is_reported_while_one_pluggable_remains() {
    let h = HarnessBuilder::new()
        .offer(1, &["1280x720p-60"])
        .offer(2, &["1280x720p-60"])
        .start()
        .await;
    for fb in 0..3 {
        h.display.interface_connected(fb).unwrap();
    }
    settle().await;

    h.display.interface_disconnected(2).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(h.broadcaster.plugged(), vec![true, false]);
    let snapshot = h.display.snapshot().await.unwrap();
    assert!(snapshot.slots.is_connected(1).unwrap());
    assert_eq!(snapshot.slots.pluggable_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_and_stray_events_are_ignored() {
    let h = HarnessBuilder::new().start().await;

    h.display.interface_disconnected(5).unwrap();
    h.display.interface_connected(0).unwrap();
    h.display.interface_connected(0).unwrap();
    assert!(!h.display.daemon_event(602, 0).unwrap());
    settle().await;

    assert_eq!(
        h.broadcaster.events(),
        vec![Broadcast::DisplayAttached {
            slot: 0,
            connected: true
        }]
    );
    assert_eq!(h.display.snapshot().await.unwrap().slots.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_requests_are_rejected() {
    let h = HarnessBuilder::new().start().await;
    let app = settings_app();

    assert!(matches!(
        h.display.set_mirror(&app, 4, true),
        Err(DisplayError::InvariantViolation(_))
    ));
    assert!(matches!(
        h.display.daemon_event(600, 10),
        Err(DisplayError::InvariantViolation(_))
    ));
    assert!(matches!(
        h.display.settings(9).await,
        Err(DisplayError::InvariantViolation(_))
    ));
    assert!(matches!(
        h.display.set_mode(&app, 1, "1280x720"),
        Err(DisplayError::ConfigurationParseFailure(_))
    ));

    let stranger = CallerId::new(20_000u32, 3);
    assert_eq!(
        h.display.set_rotation(&stranger, 1, true).unwrap_err(),
        DisplayError::PermissionDenied {
            caller: stranger,
            permission: Permission::ChangeDisplayState
        }
    );
    let system = CallerId::new(SERVICE_UID, 1);
    assert!(h.display.set_rotation(&system, 1, true).unwrap());

    settle().await;
    assert_eq!(
        h.settings.puts(),
        vec![("plugged_display_2_rotation".to_string(), "1".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn snapshot_serializes() {
    let h = HarnessBuilder::new().start().await;
    h.display.interface_connected(0).unwrap();
    settle().await;

    let json = serde_json::to_value(h.display.snapshot().await.unwrap()).unwrap();
    assert_eq!(json["displays"][0]["mode"], "1920x1080p-60");
    assert_eq!(json["slots"]["connect_count"], 1);
    assert_eq!(json["plugged"], false);
}
