use std::process::Command;

fn duel_defence() -> Command {
    Command::new(env!("CARGO_BIN_EXE_duel-defence"))
}

#[test]
fn built_in_match_runs_to_an_outcome() {
    let output = duel_defence()
        .args(["--max-seconds", "30", "--seed", "99"])
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run the duel-defence binary");

    assert!(output.status.success(), "match exited with {:?}", output.status);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("wins") || stdout.contains("draw"),
        "unexpected summary: {stdout}"
    );
    assert!(stdout.contains("board 0 lives"));
}

#[test]
fn missing_configuration_file_is_reported() {
    let output = duel_defence()
        .args(["--config", "does/not/exist.toml"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run the duel-defence binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read match configuration"));
}
