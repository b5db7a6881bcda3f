//! Full-session tests against an in-process mock simulator.
//!
//! The mock peer reuses the crate's own `Channel` for its side of the
//! conversation, scripts exact byte sequences for each exchange, and
//! records the verbs it served so tests can assert on ordering (e.g. how
//! many wait-idle exchanges bracket a move).

use std::time::Duration;

use anyhow::Result;
use pretty_assertions::assert_eq;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use robolink::protocol::Channel;
use robolink::{Client, ClientConfig, Item, ItemType, Joints, LinkError, Pose, Target};

const SERVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Opt-in client logging for test runs (`RUST_LOG=debug cargo test`).
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Accept one connection and serve the handshake.
async fn accept_api(listener: &TcpListener) -> Result<Channel> {
    let (stream, _) = listener.accept().await?;
    let mut channel = Channel::new(stream, SERVER_TIMEOUT);
    assert_eq!(channel.recv_line().await?, "CMD_START");
    assert_eq!(channel.recv_line().await?, "1 0");
    channel.send_line("READY 1 0").await?;
    Ok(channel)
}

fn config_for(port: u16) -> ClientConfig {
    ClientConfig {
        port,
        timeout: Duration::from_secs(2),
        ..ClientConfig::default()
    }
}

/// Bind a listener and connect a client to it; returns the client and the
/// server-side channel of the accepted session.
async fn connected_pair() -> Result<(Client, Channel)> {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let server: JoinHandle<Result<Channel>> =
        tokio::spawn(async move { accept_api(&listener).await });
    let client = Client::connect(config_for(port)).await?;
    let channel = server.await??;
    Ok((client, channel))
}

#[tokio::test]
async fn handshake_ready_connects() -> Result<()> {
    let (client, _server) = connected_pair().await?;
    assert!(client.is_connected());
    assert_eq!(client.process_id(), None);
    Ok(())
}

#[tokio::test]
async fn handshake_rejection_leaves_disconnected() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut channel = Channel::new(stream, SERVER_TIMEOUT);
        let _ = channel.recv_line().await;
        let _ = channel.recv_line().await;
        channel.send_line("BUSY").await.unwrap();
    });

    let err = Client::connect(config_for(port)).await.expect_err("rejected");
    match err {
        LinkError::HandshakeRejected(reply) => assert_eq!(reply, "BUSY"),
        other => panic!("expected HandshakeRejected, got {other:?}"),
    }
    server.await?;
    Ok(())
}

#[tokio::test]
async fn item_lookup_round_trip() -> Result<()> {
    let (mut client, mut server) = connected_pair().await?;
    let exchange = tokio::spawn(async move {
        assert_eq!(server.recv_line().await.unwrap(), "G_Item");
        assert_eq!(server.recv_line().await.unwrap(), "UR10");
        server.send_item(Item::new(77, ItemType::Unknown)).await.unwrap();
        server.send_int(0).await.unwrap();
        server
    });

    let item = client.item("UR10").await?;
    assert!(item.is_valid());
    assert_eq!(item.id(), 77);
    // The wire carries no type tag; the handle stays untyped until queried.
    assert_eq!(item.item_type(), ItemType::Unknown);
    exchange.await?;
    Ok(())
}

#[tokio::test]
async fn failed_lookup_returns_invalid_handle() -> Result<()> {
    let (mut client, mut server) = connected_pair().await?;
    let exchange = tokio::spawn(async move {
        assert_eq!(server.recv_line().await.unwrap(), "G_Item2");
        assert_eq!(server.recv_line().await.unwrap(), "missing");
        assert_eq!(server.recv_int().await.unwrap(), 2); // robot type tag
        server.send_item(Item::NULL).await.unwrap();
        server.send_int(0).await.unwrap();
    });

    let item = client.item_of_type("missing", ItemType::Robot).await?;
    assert!(!item.is_valid());
    exchange.await?;
    Ok(())
}

#[tokio::test]
async fn remote_error_surfaces_message_and_keeps_connection() -> Result<()> {
    let (mut client, mut server) = connected_pair().await?;
    let exchange = tokio::spawn(async move {
        // First exchange fails with a remote error...
        assert_eq!(server.recv_line().await.unwrap(), "G_Thetas");
        let _item = server.recv_item().await.unwrap();
        server.send_int(3).await.unwrap();
        server.send_line("Robot not selected").await.unwrap();
        // ...second exchange succeeds: the stream stayed aligned.
        assert_eq!(server.recv_line().await.unwrap(), "G_Thetas");
        let _item = server.recv_item().await.unwrap();
        server.send_array(&[10.0, 20.0, 30.0]).await.unwrap();
        server.send_int(0).await.unwrap();
    });

    let robot = Item::new(5, ItemType::Unknown);
    let err = client.joints(robot).await.expect_err("remote error");
    match err {
        LinkError::Remote(message) => assert_eq!(message, "Robot not selected"),
        other => panic!("expected Remote, got {other:?}"),
    }
    assert!(client.is_connected());

    let joints = client.joints(robot).await?;
    assert_eq!(joints.as_slice(), &[10.0, 20.0, 30.0]);
    exchange.await?;
    Ok(())
}

#[tokio::test]
async fn warning_status_is_success() -> Result<()> {
    let (mut client, mut server) = connected_pair().await?;
    let exchange = tokio::spawn(async move {
        assert_eq!(server.recv_line().await.unwrap(), "S_Thetas");
        let values = server.recv_array().await.unwrap();
        assert_eq!(values, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let _item = server.recv_item().await.unwrap();
        server.send_int(2).await.unwrap();
        server.send_line("Joints close to limits").await.unwrap();
    });

    let joints = Joints::from([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    client.set_joints(Item::new(5, ItemType::Unknown), &joints).await?;
    exchange.await?;
    Ok(())
}

/// Serve any number of WaitMove/MoveX/MoveC exchanges, recording the verb
/// order, until the connection closes.
async fn serve_motion(mut server: Channel) -> Vec<String> {
    let mut verbs = Vec::new();
    loop {
        let verb = match server.recv_line().await {
            Ok(verb) => verb,
            Err(_) => return verbs, // client disconnected
        };
        verbs.push(verb.clone());
        match verb.as_str() {
            "WaitMove" => {
                let _item = server.recv_item().await.unwrap();
                server.send_int(0).await.unwrap(); // acknowledged
                server.send_int(0).await.unwrap(); // idle
            }
            "MoveX" => {
                let _move_kind = server.recv_int().await.unwrap();
                let _tag = server.recv_int().await.unwrap();
                let _array = server.recv_array().await.unwrap();
                let _target = server.recv_item().await.unwrap();
                let _robot = server.recv_item().await.unwrap();
                server.send_int(0).await.unwrap();
            }
            "MoveC" => {
                let _three = server.recv_int().await.unwrap();
                for _ in 0..2 {
                    let _tag = server.recv_int().await.unwrap();
                    let _array = server.recv_array().await.unwrap();
                    let _target = server.recv_item().await.unwrap();
                }
                let _robot = server.recv_item().await.unwrap();
                server.send_int(0).await.unwrap();
            }
            other => panic!("unexpected verb {other}"),
        }
    }
}

#[tokio::test]
async fn nonblocking_move_waits_once_before_and_not_after() -> Result<()> {
    let (mut client, server) = connected_pair().await?;
    let motion = tokio::spawn(serve_motion(server));

    let robot = Item::new(9, ItemType::Unknown);
    client
        .move_joints(robot, Joints::from([0.0, -90.0, 90.0, 0.0, 90.0, 0.0]), false)
        .await?;
    client.disconnect();

    let verbs = motion.await?;
    assert_eq!(verbs, ["WaitMove", "MoveX"]);
    Ok(())
}

#[tokio::test]
async fn blocking_move_waits_before_and_after() -> Result<()> {
    let (mut client, server) = connected_pair().await?;
    let motion = tokio::spawn(serve_motion(server));

    let robot = Item::new(9, ItemType::Unknown);
    client
        .move_linear(robot, Pose::translation(300.0, 0.0, 400.0), true)
        .await?;
    client.disconnect();

    let verbs = motion.await?;
    assert_eq!(verbs, ["WaitMove", "MoveX", "WaitMove"]);
    Ok(())
}

#[tokio::test]
async fn move_target_encodings_are_positional() -> Result<()> {
    let (mut client, mut server) = connected_pair().await?;
    let robot = Item::new(9, ItemType::Unknown);
    let target_item = Item::new(33, ItemType::Unknown);
    let joints = Joints::from([10.0, 20.0, 30.0]);
    let pose = Pose::translation(1.0, 2.0, 3.0);
    let pose_wire = pose.to_col_major();

    let exchange = tokio::spawn(async move {
        // Wait-idle bracket of the circular move.
        assert_eq!(server.recv_line().await.unwrap(), "WaitMove");
        let _ = server.recv_item().await.unwrap();
        server.send_int(0).await.unwrap();
        server.send_int(0).await.unwrap();

        assert_eq!(server.recv_line().await.unwrap(), "MoveC");
        assert_eq!(server.recv_int().await.unwrap(), 3);

        // Intermediate: joints -> tag 1, values in the array, null handle.
        assert_eq!(server.recv_int().await.unwrap(), 1);
        assert_eq!(server.recv_array().await.unwrap(), &[10.0, 20.0, 30.0]);
        assert_eq!(server.recv_item().await.unwrap(), Item::NULL);

        // Final: pose -> tag 2, 16 values column-major, null handle.
        assert_eq!(server.recv_int().await.unwrap(), 2);
        assert_eq!(server.recv_array().await.unwrap(), pose_wire.to_vec());
        assert_eq!(server.recv_item().await.unwrap(), Item::NULL);

        assert_eq!(server.recv_item().await.unwrap().id(), 9);
        server.send_int(0).await.unwrap();

        // Item-target joint move: tag 3, empty array, the handle.
        assert_eq!(server.recv_line().await.unwrap(), "WaitMove");
        let _ = server.recv_item().await.unwrap();
        server.send_int(0).await.unwrap();
        server.send_int(0).await.unwrap();

        assert_eq!(server.recv_line().await.unwrap(), "MoveX");
        assert_eq!(server.recv_int().await.unwrap(), 1);
        assert_eq!(server.recv_int().await.unwrap(), 3);
        assert!(server.recv_array().await.unwrap().is_empty());
        assert_eq!(server.recv_item().await.unwrap().id(), 33);
        assert_eq!(server.recv_item().await.unwrap().id(), 9);
        server.send_int(0).await.unwrap();
    });

    client
        .move_circular(robot, joints, Target::Pose(pose), false)
        .await?;
    client.move_joints(robot, target_item, false).await?;
    exchange.await?;
    Ok(())
}

#[tokio::test]
async fn version_exchange() -> Result<()> {
    let (mut client, mut server) = connected_pair().await?;
    let exchange = tokio::spawn(async move {
        assert_eq!(server.recv_line().await.unwrap(), "Version");
        server.send_line("RoboDK").await.unwrap();
        server.send_int(64).await.unwrap();
        server.send_line("5.6.4").await.unwrap();
        server.send_line("2023-06-21").await.unwrap();
        server.send_int(0).await.unwrap();
    });

    let version = client.version().await?;
    assert_eq!(version.application, "RoboDK");
    assert_eq!(version.bits, 64);
    assert_eq!(version.version, "5.6.4");
    exchange.await?;
    Ok(())
}

#[tokio::test]
async fn receive_timeout_poisons_connection() -> Result<()> {
    let (mut client, _server) = connected_pair().await?;
    client.set_timeout(Duration::from_millis(50));

    // The mock peer never answers: the status read must time out.
    let err = client
        .collisions()
        .await
        .expect_err("server is silent");
    assert!(matches!(err, LinkError::Timeout(_)), "got {err:?}");

    // The channel is now unusable until reconnect.
    assert!(!client.is_connected());
    let err = client.collisions().await.expect_err("poisoned");
    assert!(matches!(err, LinkError::NotConnected));
    Ok(())
}

#[tokio::test]
async fn long_operation_overrides_and_restores_timeout() -> Result<()> {
    let (mut client, mut server) = connected_pair().await?;
    client.set_timeout(Duration::from_millis(100));

    let exchange = tokio::spawn(async move {
        assert_eq!(server.recv_line().await.unwrap(), "PickItem");
        assert_eq!(server.recv_line().await.unwrap(), "Pick a robot");
        assert_eq!(server.recv_int().await.unwrap(), 2);
        // Answer well past the ordinary timeout: only the raised per-call
        // timeout lets this succeed.
        tokio::time::sleep(Duration::from_millis(400)).await;
        server.send_item(Item::new(12, ItemType::Unknown)).await.unwrap();
        server.send_int(0).await.unwrap();
        server
    });

    let picked = client.pick_item("Pick a robot", Some(ItemType::Robot)).await?;
    assert_eq!(picked.id(), 12);
    let _server = exchange.await?;

    // The override was scoped: an unanswered exchange times out at the
    // ordinary setting again (quickly, not in an hour).
    let started = std::time::Instant::now();
    let err = client.collisions().await.expect_err("server is silent");
    assert!(matches!(err, LinkError::Timeout(_)));
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[cfg(unix)]
mod smart_connect {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn stub_simulator(script: &str) -> (PathBuf, Vec<String>) {
        (
            PathBuf::from("/bin/sh"),
            vec!["-c".to_string(), script.to_string()],
        )
    }

    /// A rejecting listener makes every connect attempt fail; counting
    /// its accepted connections counts the client's attempts.
    #[tokio::test]
    async fn falls_back_to_launch_and_retries_exactly_once() -> Result<()> {
        super::init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let rejecting = tokio::spawn(async move {
            let mut accepted = 0u32;
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        accepted += 1;
                        let mut channel = Channel::new(stream, SERVER_TIMEOUT);
                        let _ = channel.recv_line().await;
                        let _ = channel.recv_line().await;
                        let _ = channel.send_line("BUSY").await;
                    }
                    Err(_) => return accepted,
                }
                if accepted >= 2 {
                    return accepted;
                }
            }
        });

        let (executable, args) = stub_simulator("echo 'RoboDK is Running'");
        let config = ClientConfig {
            executable,
            args,
            ..config_for(port)
        };

        // Both the initial attempt and the single post-launch retry hit
        // the rejecting listener; the retry's result comes back.
        let err = Client::connect_or_start(config).await.expect_err("rejected");
        assert!(matches!(err, LinkError::HandshakeRejected(_)), "got {err:?}");
        assert_eq!(rejecting.await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn connects_after_simulator_reports_running() -> Result<()> {
        // Reserve a port, then free it so the first attempt fails.
        let placeholder = TcpListener::bind("127.0.0.1:0").await?;
        let port = placeholder.local_addr()?.port();
        drop(placeholder);

        // The "simulator" comes up while the stub script is still
        // printing its startup banner.
        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            accept_api(&listener).await.unwrap()
        });

        let (executable, args) =
            stub_simulator("echo starting; sleep 0.5; echo 'RoboDK is Running'");
        let config = ClientConfig {
            executable,
            args,
            ..config_for(port)
        };

        let client = Client::connect_or_start(config).await?;
        assert!(client.is_connected());
        assert!(client.process_id().is_some());
        server.await?;
        Ok(())
    }

    #[tokio::test]
    async fn reports_failure_when_marker_never_appears() -> Result<()> {
        let placeholder = TcpListener::bind("127.0.0.1:0").await?;
        let port = placeholder.local_addr()?.port();
        drop(placeholder);

        let (executable, args) = stub_simulator("echo loading; echo done");
        let config = ClientConfig {
            executable,
            args,
            ..config_for(port)
        };

        let err = Client::connect_or_start(config).await.expect_err("no marker");
        assert!(matches!(err, LinkError::StartupFailed(_)), "got {err:?}");
        Ok(())
    }
}
