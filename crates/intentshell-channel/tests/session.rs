#![cfg(unix)]

use std::time::{Duration, Instant};

use intentshell_channel::{
    ChannelConfig, Dialect, InterpreterChannel, ScriptTransport, TIMEOUT_SENTINEL,
    WRITE_FAILED_SENTINEL,
};

async fn bash_channel() -> InterpreterChannel {
    InterpreterChannel::start(ChannelConfig::for_dialect(Dialect::Posix))
        .await
        .unwrap()
}

#[tokio::test]
async fn echo_round_trip_ascii() {
    let mut channel = bash_channel().await;
    let out = channel.submit("echo hello", false).await;
    assert_eq!(out, "hello");
    channel.close().await;
}

#[tokio::test]
async fn echo_round_trip_multibyte() {
    let mut channel = bash_channel().await;
    let text = "Merhaba dünya, こんにちは 👋";
    let out = channel.submit(&format!("echo '{text}'"), false).await;
    assert!(out.contains(text), "{out}");
    channel.close().await;
}

#[tokio::test]
async fn multi_line_output_is_preserved() {
    let mut channel = bash_channel().await;
    let out = channel.submit("echo one\necho '  two'\necho three", false).await;
    assert_eq!(out, "one\n  two\nthree");
    channel.close().await;
}

#[tokio::test]
async fn state_persists_between_requests() {
    let mut channel = bash_channel().await;
    channel.submit("GREETING=persisted", false).await;
    let out = channel.submit("echo \"$GREETING\"", false).await;
    assert_eq!(out, "persisted");
    channel.close().await;
}

#[tokio::test]
async fn failures_are_reported_as_error_lines() {
    let mut channel = bash_channel().await;
    let out = channel.submit("false", false).await;
    assert_eq!(out, "ERROR: exit status 1");

    let out = channel.submit("echo partial; exit_code_is() { return 3; }; exit_code_is", false).await;
    assert_eq!(out, "partial\nERROR: exit status 3");

    // channel still usable afterwards
    assert_eq!(channel.submit("echo ok", false).await, "ok");
    channel.close().await;
}

#[tokio::test]
async fn stderr_is_folded_into_output() {
    let mut channel = bash_channel().await;
    let out = channel.submit("echo oops >&2", false).await;
    assert_eq!(out, "oops");
    channel.close().await;
}

#[tokio::test]
async fn slow_script_times_out_within_budget() {
    let config = ChannelConfig {
        read_timeout_secs: 2,
        ..ChannelConfig::for_dialect(Dialect::Posix)
    };
    let mut channel = InterpreterChannel::start(config).await.unwrap();

    let started = Instant::now();
    let out = channel.submit("echo before; sleep 3; echo after", false).await;
    let elapsed = started.elapsed();

    assert!(out.contains("before"), "{out}");
    assert!(out.ends_with(TIMEOUT_SENTINEL), "{out}");
    assert!(!out.contains("after"), "{out}");
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");

    // late output of the abandoned request never leaks into the next one
    let out = channel.submit("echo next", false).await;
    assert_eq!(out, "next");
    channel.close().await;
}

#[tokio::test]
async fn killed_interpreter_is_respawned() {
    let mut channel = bash_channel().await;
    let first = channel.pid().unwrap();

    let status = tokio::process::Command::new("bash")
        .arg("-c")
        .arg(format!("kill -9 {first}"))
        .status()
        .await
        .unwrap();
    assert!(status.success());
    tokio::time::sleep(Duration::from_millis(200)).await;

    let out = channel.submit("echo recovered", false).await;
    assert_eq!(out, "recovered");
    let second = channel.pid().unwrap();
    assert_ne!(first, second);
    channel.close().await;
}

#[tokio::test]
async fn write_failure_is_reported_then_respawned() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawned");
    // First instance swallows the bring-up line, closes stdin and idles;
    // later instances are a normal shell.
    let script = format!(
        "if [ -e '{m}' ]; then exec bash --noprofile --norc; fi; \
         touch '{m}'; read -r _; exec 0<&-; sleep 30",
        m = marker.display()
    );
    let config = ChannelConfig {
        program: Some("bash".into()),
        args: Some(vec!["--noprofile".into(), "--norc".into(), "-c".into(), script]),
        bring_up_timeout_secs: 1,
        ..ChannelConfig::for_dialect(Dialect::Posix)
    };
    let mut channel = InterpreterChannel::start(config).await.unwrap();
    let first = channel.pid().unwrap();
    assert!(channel.is_running());

    let out = channel.submit("echo lost", false).await;
    assert_eq!(out, WRITE_FAILED_SENTINEL);
    assert!(channel.pid().is_none());

    let out = channel.submit("echo recovered", false).await;
    assert_eq!(out, "recovered");
    assert_ne!(channel.pid().unwrap(), first);
    channel.close().await;
}

#[tokio::test]
async fn exit_inside_script_recovers_on_next_call() {
    let mut channel = bash_channel().await;
    let out = channel.submit("exit 0", false).await;
    assert!(out.starts_with("ERROR:"), "{out}");
    assert_eq!(channel.submit("echo back", false).await, "back");
    channel.close().await;
}

#[tokio::test]
async fn bring_up_script_defines_functions() {
    let config = ChannelConfig {
        bring_up_script: "greet() { echo \"hi $1\"; }".into(),
        ..ChannelConfig::for_dialect(Dialect::Posix)
    };
    let mut channel = InterpreterChannel::start(config).await.unwrap();
    assert_eq!(channel.submit("greet there", false).await, "hi there");
    channel.close().await;
}

#[tokio::test]
async fn embedded_text_arrives_verbatim() {
    let mut channel = bash_channel().await;
    let text = "it's \"quoted\" $HOME `uname` ; done";
    let script = format!("printf '%s\\n' {}", Dialect::Posix.embed_text(text));
    assert_eq!(channel.submit(&script, false).await, text);
    channel.close().await;
}

#[tokio::test]
async fn works_through_transport_trait() {
    async fn run<T: ScriptTransport>(transport: &mut T) -> String {
        transport.submit("echo via-trait", false).await
    }
    let mut channel = bash_channel().await;
    assert_eq!(ScriptTransport::dialect(&channel), Dialect::Posix);
    assert_eq!(run(&mut channel).await, "via-trait");
    channel.close().await;
}
