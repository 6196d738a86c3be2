//! End-to-end supervision scenarios with real child processes

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use kiosk_watch::process::is_process_alive;
use kiosk_watch::supervisor::CloseAction;

use super::helpers::{lines, module, source, wait_until, write_script, RunningSupervisor};

#[test]
#[serial]
fn test_crashing_module_is_restarted_up_to_its_limit() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let starts = temp.path().join("starts");
    let script = write_script(
        temp.path(),
        "crasher",
        &format!("echo $$ >> '{}'\nexit 3", starts.display()),
    );

    let mut crasher = module("crasher", &script);
    crasher.max_start_count = 3;
    let running = RunningSupervisor::start(source(vec![crasher]));

    assert!(wait_until(Duration::from_secs(10), || lines(&starts).len() == 3));
    assert!(wait_until(Duration::from_secs(5), || running
        .bus
        .published()
        .iter()
        .any(|m| m == "type=module_closed;sender=crasher")));

    thread::sleep(Duration::from_millis(800));
    assert_eq!(lines(&starts).len(), 3);

    let supervisor = running.stop();
    assert!(!supervisor.module("crasher").unwrap().need_to_start);
}

#[test]
#[serial]
fn test_silent_module_is_killed_and_restarted() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let starts = temp.path().join("starts");
    let script = write_script(
        temp.path(),
        "silent",
        &format!("echo $$ >> '{}'\nexec sleep 30", starts.display()),
    );

    let running = RunningSupervisor::start(source(vec![module("silent", &script)]));

    assert!(wait_until(Duration::from_secs(15), || lines(&starts).len() >= 2));
    let first_pid: u32 = lines(&starts)[0].parse().unwrap();
    assert!(!is_process_alive(first_pid));

    let supervisor = running.stop();
    assert!(supervisor.exit_requested());
    assert!(supervisor.module("silent").unwrap().kill_on_start_count >= 1);
}

#[test]
#[serial]
fn test_exit_command_closes_modules_and_ends_loop() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let starts = temp.path().join("starts");
    let script = write_script(
        temp.path(),
        "ui",
        &format!("echo $$ >> '{}'\nexec sleep 30", starts.display()),
    );

    let mut ui = module("ui", &script);
    ui.first_ping_timeout = 60;
    ui.kill_timeout = Some(2);
    let running = RunningSupervisor::start(source(vec![ui]));

    assert!(wait_until(Duration::from_secs(10), || !lines(&starts).is_empty()));
    let pid: u32 = lines(&starts)[0].parse().unwrap();

    assert!(running.bus.inject("sender=operator;type=exit"));
    let supervisor = running.join();

    assert_eq!(supervisor.close_action(), CloseAction::Exit);
    assert!(!is_process_alive(pid));
    assert!(!supervisor.is_bus_connected());
}

#[test]
#[serial]
fn test_launch_arguments_are_used_once() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let args = temp.path().join("args");
    let script = write_script(
        temp.path(),
        "echoer",
        &format!("echo \"start:$1\" >> '{}'\nexit 0", args.display()),
    );

    let mut echoer = module("echoer", &script);
    echoer.max_start_count = 2;
    let launch_args = HashMap::from([("echoer".to_string(), "--first".to_string())]);
    let running = RunningSupervisor::start(source(vec![echoer]).with_launch_args(launch_args));

    assert!(wait_until(Duration::from_secs(10), || lines(&args).len() == 2));
    running.stop();

    assert_eq!(lines(&args), vec!["start:--first", "start:"]);
}
