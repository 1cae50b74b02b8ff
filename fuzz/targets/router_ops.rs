#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use bayeux_router::{Broker, BrokerConfig, LocalSession};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Subscribe { session: u8, path: String },
    Unsubscribe { session: u8, path: String },
    Publish { path: String },
    Remove { path: String },
    Expire { session: u8 },
    Sweep,
}

fuzz_target!(|ops: Vec<Op>| {
    let broker = Broker::new(BrokerConfig::default());
    let sessions: Vec<_> = (0..4).map(|_| LocalSession::handshaken()).collect();

    for op in ops {
        match op {
            Op::Subscribe { session, path } => {
                let (s, _) = &sessions[session as usize % sessions.len()];
                let _ = broker.subscribe(&s.session_ref(), &path);
            }
            Op::Unsubscribe { session, path } => {
                let (s, _) = &sessions[session as usize % sessions.len()];
                let _ = broker.unsubscribe(&s.session_ref(), &path);
            }
            Op::Publish { path } => {
                let _ = broker.publish(None, &path, serde_json::Value::Null);
            }
            Op::Remove { path } => {
                if let Some(node) = broker.get_channel(&path) {
                    node.remove();
                }
            }
            Op::Expire { session } => {
                sessions[session as usize % sessions.len()].0.expire();
            }
            Op::Sweep => {
                broker.sweep();
            }
        }
    }

    // Каждый канал реестра достижим из корня и совпадает с узлом дерева.
    for channel in broker.channels() {
        let mut node = broker.root().clone();
        for segment in channel.id().segments() {
            node = node
                .child(segment)
                .expect("registered channel is reachable");
        }
        assert!(Arc::ptr_eq(&node, &channel));
    }
});
