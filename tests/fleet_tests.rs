mod common;

use std::time::Duration;

use common::{config, MockChannel};
use fleetward::domain::dispatch::ActionRequest;
use fleetward::domain::fleet_service::FleetService;
use fleetward::domain::monitor::PassSummary;
use fleetward::domain::types::{HostState, LifecycleState, StatsSnapshot};

const A: &str = "10.0.0.1";
const B: &str = "10.0.0.2";
const C: &str = "10.0.0.3";

#[tokio::test(start_paused = true)]
async fn never_observed_hosts_are_unknown() {
    let channel = MockChannel::new(&[A, B]);
    let fleet = FleetService::new(config(&[A, B]), channel.clone());

    let status = fleet.fleet_status().await;
    assert_eq!(status.hosts.len(), 2);
    assert!(status.hosts.iter().all(|h| h.state == HostState::Unknown));
    assert!(status.hosts.iter().all(|h| h.observed_at.is_none()));
    // Reading status never touches the hosts.
    assert!(channel.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn monitor_pass_classifies_each_host() {
    let channel = MockChannel::new(&[A, B, C]);
    channel.update(A, |sim| {
        sim.running = true;
        sim.pid = 10;
        sim.log = "Connections: 5\nViewers: 12\n".into();
    });
    channel.update(B, |sim| sim.reachable = false);
    channel.update(C, |sim| sim.vpn_connected = false);
    let fleet = FleetService::new(config(&[A, B, C]), channel.clone());

    let summary = fleet.monitor().run_pass().await;
    assert_eq!(
        summary,
        PassSummary {
            running: 1,
            stopped: 1,
            offline: 1,
        }
    );

    let status = fleet.fleet_status().await;
    let a = status.get(A).unwrap();
    assert_eq!(a.state, HostState::Running);
    assert_eq!(
        a.stats,
        Some(StatsSnapshot {
            connections: 5,
            viewers: 12,
            pings: 0,
            heartbeats: 0,
        })
    );
    assert!(a.vpn.as_ref().unwrap().connected);

    let b = status.get(B).unwrap();
    assert_eq!(b.state, HostState::Offline);
    assert!(b.error.as_ref().unwrap().contains("cannot connect"));
    assert!(b.vpn.is_none());

    let c = status.get(C).unwrap();
    assert_eq!(c.state, HostState::Stopped);
    assert_eq!(c.stats, None);
    assert!(!c.vpn.as_ref().unwrap().connected);
}

#[tokio::test(start_paused = true)]
async fn running_host_with_empty_log_has_no_stats() {
    let channel = MockChannel::new(&[A]);
    channel.update(A, |sim| {
        sim.running = true;
        sim.pid = 10;
    });
    let fleet = FleetService::new(config(&[A]), channel.clone());

    let entry = fleet.monitor().check_host(A).await;
    assert_eq!(entry.state, LifecycleState::Running);
    assert_eq!(entry.stats, None);
}

#[tokio::test(start_paused = true)]
async fn entries_are_replaced_wholesale() {
    let channel = MockChannel::new(&[A]);
    channel.update(A, |sim| {
        sim.running = true;
        sim.pid = 10;
        sim.log = "Pings: 3".into();
    });
    let fleet = FleetService::new(config(&[A]), channel.clone());

    fleet.monitor().run_pass().await;
    assert!(fleet.fleet_status().await.get(A).unwrap().stats.is_some());

    channel.update(A, |sim| sim.running = false);
    fleet.monitor().run_pass().await;
    let a = fleet.fleet_status().await.get(A).cloned().unwrap();
    assert_eq!(a.state, HostState::Stopped);
    assert_eq!(a.stats, None);

    channel.update(A, |sim| sim.reachable = false);
    fleet.monitor().run_pass().await;
    let a = fleet.fleet_status().await.get(A).cloned().unwrap();
    assert_eq!(a.state, HostState::Offline);
    assert!(a.vpn.is_none());
}

#[tokio::test(start_paused = true)]
async fn monitor_loop_checks_at_startup_then_every_interval() {
    let channel = MockChannel::new(&[A, B, C]);
    channel.update(B, |sim| sim.reachable = false);
    let fleet = FleetService::new(config(&[A, B, C]), channel.clone());
    assert_eq!(fleet.config().monitor.interval_secs, 10);

    let passes = |channel: &MockChannel| channel.commands_for(B).len();
    let observed_a = |status: &fleetward::domain::types::FleetStatus| {
        status.get(A).and_then(|h| h.observed_at).unwrap()
    };

    let handle = tokio::spawn(fleet.monitor().run_loop());

    // First pass runs immediately.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(passes(&channel), 1);
    let first = fleet.fleet_status().await;
    assert_eq!(first.get(B).unwrap().state, HostState::Offline);
    assert_eq!(first.get(C).unwrap().state, HostState::Stopped);

    // Nothing happens between ticks.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(passes(&channel), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(passes(&channel), 2);
    let second = fleet.fleet_status().await;
    assert!(observed_a(&second) >= observed_a(&first));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(passes(&channel), 3);
    let third = fleet.fleet_status().await;
    assert!(observed_a(&third) >= observed_a(&second));

    // The unreachable host never stopped the loop from reaching the others.
    assert_eq!(channel.commands_for(A).len(), 6);
    assert_eq!(channel.commands_for(C).len(), 6);
    assert_eq!(third.get(B).unwrap().state, HostState::Offline);
    assert!(!handle.is_finished());
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn manual_check_populates_cache() {
    let channel = MockChannel::new(&[A, B]);
    let fleet = FleetService::new(config(&[A, B]), channel.clone());

    let status = fleet.check_host(A).await.unwrap();
    assert_eq!(status.state, HostState::Stopped);

    let fleet_status = fleet.fleet_status().await;
    assert_eq!(fleet_status.get(A).unwrap().state, HostState::Stopped);
    assert_eq!(fleet_status.get(B).unwrap().state, HostState::Unknown);

    assert!(fleet.check_host("10.9.9.9").await.is_err());
}

#[tokio::test(start_paused = true)]
async fn fleet_wide_action_isolates_unreachable_host() {
    let channel = MockChannel::new(&[A, B, C]);
    for host in [A, C] {
        channel.update(host, |sim| {
            sim.running = true;
            sim.pid = 20;
        });
    }
    channel.update(B, |sim| sim.reachable = false);
    let fleet = FleetService::new(config(&[A, B, C]), channel.clone());

    let response = fleet.perform_action(&ActionRequest::new("stop_all")).await;

    assert!(!response.success);
    assert_eq!(response.results.len(), 3);
    assert_eq!(response.results[0].host, A);
    assert!(response.results[0].success);
    assert_eq!(response.results[1].host, B);
    assert!(!response.results[1].success);
    assert!(response.results[1].message.starts_with("cannot connect to 10.0.0.2"));
    assert_eq!(response.results[2].host, C);
    assert!(response.results[2].success);

    assert!(!channel.commands_for(C).is_empty());
    assert!(response.message.starts_with("Stop on all hosts\n"));
    assert!(response.message.contains("10.0.0.1: payload stopped"));
    assert!(response.message.contains("10.0.0.3: payload stopped"));
}

#[tokio::test(start_paused = true)]
async fn fleet_wide_actions_run_hosts_in_roster_order() {
    let channel = MockChannel::new(&[A, B, C]);
    let fleet = FleetService::new(config(&[A, B, C]), channel.clone());

    let response = fleet
        .perform_action(&ActionRequest::new("mullvad_reconnect_all"))
        .await;
    assert!(response.success, "{}", response.message);

    let hosts: Vec<String> = channel.calls().into_iter().map(|(h, _)| h).collect();
    let last_a = hosts.iter().rposition(|h| h == A).unwrap();
    let first_b = hosts.iter().position(|h| h == B).unwrap();
    let last_b = hosts.iter().rposition(|h| h == B).unwrap();
    let first_c = hosts.iter().position(|h| h == C).unwrap();
    assert!(last_a < first_b);
    assert!(last_b < first_c);
}

#[tokio::test(start_paused = true)]
async fn single_host_actions_validate_target() {
    let channel = MockChannel::new(&[A]);
    let fleet = FleetService::new(config(&[A]), channel.clone());

    let missing = fleet.perform_action(&ActionRequest::new("start_one")).await;
    assert!(!missing.success);
    assert_eq!(missing.message, "action start_one requires a target host");

    let unknown = fleet
        .perform_action(&ActionRequest::new("stop").with_host("10.9.9.9"))
        .await;
    assert!(!unknown.success);
    assert_eq!(unknown.message, "unknown host: 10.9.9.9");

    let invalid = fleet.perform_action(&ActionRequest::new("reboot_all")).await;
    assert!(!invalid.success);
    assert_eq!(invalid.message, "invalid action: reboot_all");

    assert!(channel.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn start_one_passes_parameters() {
    let channel = MockChannel::new(&[A]);
    let fleet = FleetService::new(config(&[A]), channel.clone());

    let mut request = ActionRequest::new("start").with_host(A);
    request.channel = "streamer".into();
    request.viewers = 42;
    let response = fleet.perform_action(&request).await;
    assert!(response.success, "{}", response.message);
    assert_eq!(response.results.len(), 1);

    let launcher = channel
        .host(A)
        .files
        .values()
        .next()
        .cloned()
        .unwrap();
    assert!(launcher.contains("streamer 42 |"));
}

#[tokio::test(start_paused = true)]
async fn vpn_random_one_honours_explicit_location() {
    let channel = MockChannel::new(&[A]);
    let fleet = FleetService::new(config(&[A]), channel.clone());

    let mut request = ActionRequest::new("vpn_random_one").with_host(A);
    request.location = Some("sg-sin".into());
    let response = fleet.perform_action(&request).await;
    assert!(response.success, "{}", response.message);
    assert_eq!(response.message, "connected to sg-sin");
}

#[tokio::test(start_paused = true)]
async fn logs_for_unknown_host_make_no_remote_call() {
    let channel = MockChannel::new(&[A]);
    let fleet = FleetService::new(config(&[A]), channel.clone());

    let logs = fleet.logs("10.9.9.9").await;
    assert!(logs.logs.is_empty());
    assert_eq!(logs.error.as_deref(), Some("unknown host: 10.9.9.9"));
    assert!(channel.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn logs_split_into_lines() {
    let channel = MockChannel::new(&[A, B]);
    channel.update(A, |sim| sim.log = "line one\nline two\n".into());
    channel.update(B, |sim| sim.reachable = false);
    let fleet = FleetService::new(config(&[A, B]), channel.clone());

    let logs = fleet.logs(A).await;
    assert_eq!(logs.logs, vec!["line one", "line two"]);
    assert_eq!(logs.error, None);
    assert_eq!(
        channel.commands_for(A),
        vec!["tail -n 100 /home/kali/Desktop/kick-viewbot-main/kick.log".to_string()]
    );

    let unreachable = fleet.logs(B).await;
    assert!(unreachable.logs.is_empty());
    assert!(unreachable.error.unwrap().contains("cannot connect"));
}
