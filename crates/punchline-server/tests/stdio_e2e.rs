use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

fn send(stdin: &mut impl Write, reader: &mut impl BufRead, req: Value) -> Value {
    writeln!(stdin, "{}", req).unwrap();
    stdin.flush().unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).expect("failed to read response");
    serde_json::from_str(&line).unwrap_or_else(|e| panic!("bad response {:?}: {}", line, e))
}

#[test]
fn test_stdio_flow() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("punchline.db");

    let mut child = Command::new(env!("CARGO_BIN_EXE_punchline-server"))
        .args(["--fake", "--db"])
        .arg(&db)
        .env_remove("OPENROUTER_API_KEY")
        .env("PUNCHLINE_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn server");

    let mut stdin = child.stdin.take().unwrap();
    let mut reader = BufReader::new(child.stdout.take().unwrap());

    let resp = send(
        &mut stdin,
        &mut reader,
        json!({ "jsonrpc": "2.0", "method": "compete", "params": { "word": "lamp" }, "id": 1 }),
    );
    assert_eq!(resp["id"], json!(1));
    let game_id = resp["result"]["game_id"].as_str().unwrap().to_string();

    // Garbage gets no reply; the next request is still served.
    writeln!(stdin, "this is not json").unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        let resp = send(
            &mut stdin,
            &mut reader,
            json!({ "jsonrpc": "2.0", "method": "compete/status", "params": { "game_id": game_id }, "id": 2 }),
        );
        assert_eq!(resp["id"], json!(2), "{}", resp);
        if resp["result"]["ready"] == json!(true) {
            break resp["result"].clone();
        }
        assert!(Instant::now() < deadline, "never ready: {}", resp);
        std::thread::sleep(Duration::from_millis(20));
    };

    let ids = status["payload"]["ballot"][0]["result_ids"].clone();
    let resp = send(
        &mut stdin,
        &mut reader,
        json!({ "jsonrpc": "2.0", "method": "vote", "params": { "game_id": game_id, "result_ids": ids }, "id": 3 }),
    );
    assert!(resp["result"]["receipt"]["winning_result_id"].is_i64(), "{}", resp);

    let resp = send(
        &mut stdin,
        &mut reader,
        json!({ "jsonrpc": "2.0", "method": "leaderboard", "id": 4 }),
    );
    let wins: u64 = resp["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["win_count"].as_u64().unwrap())
        .sum();
    assert!(wins >= 1);

    drop(stdin);
    let status = child.wait().unwrap();
    assert!(status.success());
    assert!(db.exists());
}
