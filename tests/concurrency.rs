use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
};

use bayeux_router::{
    pubsub::{initializer, ChannelListener},
    Broker, BrokerConfig, ChannelError, ChannelNode, LocalSession, SessionRef,
};
use serde_json::json;

/// Кол-во потоков для стресс тестов
const THREADS: usize = 16;

/// Кол-во итераций на поток
const ITERATIONS: usize = 500;

#[derive(Default)]
struct AddedCounter(AtomicUsize);

impl ChannelListener for AddedCounter {
    fn channel_added(
        &self,
        _channel: &Arc<ChannelNode>,
    ) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn handshaken(id: String) -> (Arc<LocalSession>, SessionRef) {
    let (session, _inbox) = LocalSession::with_id(id);
    session.handshake();
    let sref = session.session_ref();
    (session, sref)
}

/// Каждый путь из корня к узлу в реестре должен вести к тому же самому
/// экземпляру узла.
fn assert_registry_matches_tree(broker: &Broker) {
    for channel in broker.channels() {
        let mut node = broker.root().clone();
        for segment in channel.id().segments() {
            node = node
                .child(segment)
                .unwrap_or_else(|| panic!("{} is not reachable", channel.id()));
        }
        assert!(Arc::ptr_eq(&node, &channel), "{}", channel.id());
    }
}

/// Тест проверяет, что при одновременном создании одного пути все потоки
/// получают один и тот же, уже настроенный глобальным инициализатором узел,
/// а хуки создания срабатывают ровно один раз на каждый узел.
#[test]
fn test_concurrent_create_same_path() {
    let broker = Broker::new(BrokerConfig::default());
    let added = Arc::new(AddedCounter::default());
    broker.add_listener(bayeux_router::Listener::Channel(added.clone()));
    broker.add_listener(bayeux_router::Listener::Initializer(initializer(|channel| {
        channel.set_lazy(true);
    })));

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let broker = broker.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let node = broker.channel("/a/b/c/d").unwrap();
                // инициализатор должен быть виден сразу же, без ожидания
                let configured = node.is_lazy();
                (node, configured)
            })
        })
        .collect();

    let nodes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for (node, configured) in &nodes {
        assert!(Arc::ptr_eq(node, &nodes[0].0));
        assert!(node.is_initialized());
        assert!(*configured, "caller observed an unconfigured channel");
    }
    assert_eq!(added.0.load(Ordering::SeqCst), 4);
    assert_eq!(broker.channel_count(), 4);
    assert_registry_matches_tree(&broker);
}

/// Тест проверяет, что из гонки создания листа с инициализаторами выходит
/// ровно один победитель, и инициализатор выполняется один раз.
#[test]
fn test_concurrent_create_with_initializers() {
    let broker = Broker::new(BrokerConfig::default());
    let runs = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let broker = broker.clone();
            let barrier = barrier.clone();
            let runs = runs.clone();
            thread::spawn(move || {
                let init = initializer(move |channel| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    channel.set_persistent(true);
                });
                barrier.wait();
                broker.create_channel("/race/leaf", &[init])
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(node) => {
                winners += 1;
                assert!(node.is_persistent());
            }
            Err(ChannelError::AlreadyInitialized { channel }) => {
                assert_eq!(channel, "/race/leaf");
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Тест проверяет гонку подписки с автоматическим удалением: после того
/// как все потоки закончили чередовать подписку и отписку и в конце
/// подписались, каждая подписка находится в узле, достижимом из корня.
#[test]
fn test_subscribe_unsubscribe_churn() {
    let broker = Broker::new(BrokerConfig::default());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let broker = broker.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let (session, sref) = handshaken(format!("churn-{t}"));
                let path = format!("/churn/{}", t % 4);
                barrier.wait();
                for _ in 0..ITERATIONS {
                    assert!(broker.subscribe(&sref, &path).unwrap());
                    broker.unsubscribe(&sref, &path).unwrap();
                }
                assert!(broker.subscribe(&sref, &path).unwrap());
                (session, path)
            })
        })
        .collect();

    let sessions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for (session, path) in &sessions {
        let node = broker
            .get_channel(path)
            .unwrap_or_else(|| panic!("{path} must exist"));
        assert!(node.is_live());
        assert!(node.is_subscribed(bayeux_router::Session::id(&**session)));
    }
    assert_registry_matches_tree(&broker);
}

/// Тест проверяет, что публикации параллельно с подписками не теряют
/// сообщений для уже подписанных сессий.
#[test]
fn test_publish_while_subscribing() {
    let broker = Broker::new(BrokerConfig::default());
    let (reader, mut inbox) = LocalSession::with_id("reader");
    reader.handshake();
    broker.subscribe(&reader.session_ref(), "/stream/**").unwrap();
    // закреплённые цели не удаляются, пока поздние подписчики уходят
    for t in 0..4 {
        broker
            .channel(&format!("/stream/{t}"))
            .unwrap()
            .set_persistent(true);
    }

    let publishers: Vec<_> = (0..4)
        .map(|t| {
            let broker = broker.clone();
            thread::spawn(move || {
                for i in 0..ITERATIONS {
                    broker
                        .publish(None, &format!("/stream/{t}"), json!(i))
                        .unwrap();
                }
            })
        })
        .collect();

    let subscribers: Vec<_> = (0..4)
        .map(|t| {
            let broker = broker.clone();
            thread::spawn(move || {
                for i in 0..ITERATIONS / 10 {
                    let (_s, sref) = handshaken(format!("late-{t}-{i}"));
                    broker.subscribe(&sref, &format!("/stream/{t}")).unwrap();
                    broker.unsubscribe(&sref, &format!("/stream/{t}")).unwrap();
                }
            })
        })
        .collect();

    for h in publishers.into_iter().chain(subscribers) {
        h.join().unwrap();
    }

    assert_eq!(inbox.drain().len(), 4 * ITERATIONS);
    assert_eq!(broker.stats().publishes, 4 * ITERATIONS);
}

/// Тест проверяет, что очистка параллельно с подписками не отсоединяет
/// узлы, в которых есть подписчики.
#[test]
fn test_sweep_races_with_subscribe() {
    let broker = Broker::new(BrokerConfig::default());
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let sweeper = {
        let broker = broker.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                broker.sweep();
            }
        })
    };

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let broker = broker.clone();
            thread::spawn(move || {
                let (session, sref) = handshaken(format!("w-{t}"));
                for i in 0..ITERATIONS {
                    let path = format!("/sweep/{}/{}", t % 2, i % 8);
                    broker.subscribe(&sref, &path).unwrap();
                    if i % 3 != 0 {
                        broker.unsubscribe(&sref, &path).unwrap();
                    }
                }
                session
            })
        })
        .collect();

    let sessions: Vec<_> = workers.into_iter().map(|h| h.join().unwrap()).collect();
    stop.store(true, Ordering::SeqCst);
    sweeper.join().unwrap();

    for session in &sessions {
        for id in session.subscriptions() {
            let node = broker
                .get_channel(id.as_str())
                .unwrap_or_else(|| panic!("{id} lost while subscribed"));
            assert!(node.is_subscribed(bayeux_router::Session::id(&**session)));
        }
    }
    assert_registry_matches_tree(&broker);
}
