// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

/// Minimal listener example.
///
/// Demonstrates:
/// - Creating the shared job queue and worker
/// - Spawning a `Subscriber` for `std_msgs/String`
/// - Feeding it an advertised publisher list
/// - Graceful shutdown
///
/// A tiny in-process TCPROS publisher stands in for a real `/talker`
/// node so the example runs without a ROS master.
use std::io::Write;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use roslink::msgs::RosString;
use roslink::tcpros::{encode_header, read_frame, write_frame, FrameOutcome};
use roslink::{jobs, Callback, JobRunner, StaticRegistry, Subscriber, SubscriberConfig};

fn spawn_talker() -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let endpoint = format!("127.0.0.1:{}", listener.local_addr()?.port());

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };

        // Read the subscriber's header and echo its topic/type/md5 back.
        let FrameOutcome::Frame(payload) = read_frame(&mut stream) else {
            return;
        };
        let Ok(request) = roslink::tcpros::decode_header(&payload) else {
            return;
        };
        let response = vec![
            ("topic".to_string(), request.get("topic").cloned().unwrap_or_default()),
            ("md5sum".to_string(), request.get("md5sum").cloned().unwrap_or_default()),
            ("type".to_string(), request.get("type").cloned().unwrap_or_default()),
            ("callerid".to_string(), "/talker".to_string()),
        ];
        if stream.write_all(&encode_header(&response)).is_err() {
            return;
        }

        for i in 0.. {
            let msg = RosString::from(format!("hello world {}", i).as_str());
            if write_frame(&mut stream, &msg.encode()).is_err() {
                return;
            }
            thread::sleep(Duration::from_millis(200));
        }
    });

    Ok(endpoint)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let endpoint = spawn_talker()?;
    let registry = Arc::new(StaticRegistry::new());
    registry.insert("/talker", &endpoint);

    let (queue, consumer) = jobs::queue(64);
    let mut runner = JobRunner::spawn(consumer)?;

    let mut subscriber = Subscriber::<RosString>::spawn(
        "/chatter",
        "/listener",
        registry,
        queue,
        SubscriberConfig::default(),
        Callback::with_event(|msg: &RosString, event| {
            println!("heard {:?} from {}", msg.data, event.publisher_name);
        }),
    )?;

    subscriber.update_publishers(vec!["/talker".to_string()]);

    thread::sleep(Duration::from_secs(2));
    println!("publishers: {}", subscriber.publisher_count());

    subscriber.shutdown();
    runner.shutdown();
    Ok(())
}
