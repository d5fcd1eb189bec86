mod common;

use chrono::{Duration as ChronoDuration, Local};
use common::{client, FakeTv, TV_IP};
use serde_json::json;
use std::sync::atomic::Ordering;
use webos_control::{ConnectionState, DeviceIdentity, DeviceStatus, PairingStore, LIVE_TV_APP_ID};

fn paired_client(tv: &std::sync::Arc<FakeTv>) -> webos_control::TvClient {
    client(tv, DeviceIdentity::new(TV_IP), Some(PairingStore::new("key-0"))).0
}

#[tokio::test]
async fn live_device_reports_foreground_app() {
    let tv = FakeTv::paired("key-0");
    let tv_client = paired_client(&tv);

    match tv_client.get_status().await {
        DeviceStatus::On { app, now_playing } => {
            assert_eq!(app.id, "netflix");
            assert_eq!(app.title.as_deref(), Some("Netflix"));
            assert_eq!(now_playing, None);
        }
        DeviceStatus::Off => panic!("expected the device to be on"),
    }
}

#[tokio::test]
async fn live_tv_reports_the_running_programme() {
    let tv = FakeTv::paired("key-0");
    *tv.foreground.lock().unwrap() = LIVE_TV_APP_ID.to_string();
    let format = "%Y,%m,%d,%H,%M,%S";
    let now = Local::now();
    *tv.program_info.lock().unwrap() = json!({
        "channel": { "channelName": "arte HD" },
        "programList": [
            {
                "programName": "Earlier",
                "localStartTime": (now - ChronoDuration::hours(3)).format(format).to_string(),
                "localEndTime": (now - ChronoDuration::hours(2)).format(format).to_string()
            },
            {
                "programName": "Documentary",
                "localStartTime": (now - ChronoDuration::minutes(30)).format(format).to_string(),
                "localEndTime": (now + ChronoDuration::minutes(30)).format(format).to_string()
            }
        ]
    });
    let tv_client = paired_client(&tv);

    match tv_client.get_status().await {
        DeviceStatus::On { now_playing: Some(show), .. } => {
            assert_eq!(show.channel_name, "arte HD");
            assert_eq!(show.program_name, "Documentary");
            assert!(show.start().unwrap() < show.end().unwrap());
        }
        other => panic!("expected a running programme, got {:?}", other),
    }
}

#[tokio::test]
async fn unpaired_device_is_off_without_network_traffic() {
    let tv = FakeTv::new();
    let (tv_client, _) = client(&tv, DeviceIdentity::new(TV_IP), None);

    assert_eq!(tv_client.get_status().await, DeviceStatus::Off);
    assert_eq!(tv.opens(), 0);
}

#[tokio::test]
async fn unreachable_device_is_off() {
    let tv = FakeTv::paired("key-0");
    tv.reachable.store(false, Ordering::SeqCst);
    let tv_client = paired_client(&tv);

    assert_eq!(tv_client.get_status().await, DeviceStatus::Off);
    assert_eq!(tv_client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn stale_session_is_replaced_once() {
    let tv = FakeTv::paired("key-0");
    let tv_client = paired_client(&tv);
    tv_client.connection().ensure_connected().await.unwrap();
    tv.session(0).stale.store(true, Ordering::SeqCst);

    assert!(tv_client.get_status().await.is_on());
    assert_eq!(tv.opens(), 2);
}

#[tokio::test]
async fn two_failed_queries_report_off_after_one_reconnect() {
    let tv = FakeTv::paired("key-0");
    let tv_client = paired_client(&tv);
    tv_client.connection().ensure_connected().await.unwrap();
    assert_eq!(tv.opens(), 1);

    tv.queries_fail.store(true, Ordering::SeqCst);

    let status = tv_client.get_status().await;

    assert_eq!(status, DeviceStatus::Off);
    assert_eq!(tv.opens() - 1, 1, "exactly one reconnect attempt");
    assert_eq!(tv_client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn malformed_reply_keeps_the_session() {
    let tv = FakeTv::paired("key-0");
    *tv.foreground.lock().unwrap() = String::new();
    let tv_client = paired_client(&tv);

    assert_eq!(tv_client.get_status().await, DeviceStatus::Off);
    assert_eq!(tv.opens(), 1);
    assert_eq!(tv_client.state(), ConnectionState::Connected);

    *tv.foreground.lock().unwrap() = "netflix".to_string();
    assert!(tv_client.get_status().await.is_on());
    assert_eq!(tv.opens(), 1);
}
