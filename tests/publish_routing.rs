use std::sync::{Arc, Mutex};

use bayeux_router::{
    pubsub::{extension, HandlerListener, Inbox},
    Broker, BrokerConfig, ChannelError, ChannelNode, Listener, LocalSession, Message,
    PublishOutcome, SessionRef,
};
use rstest::rstest;
use serde_json::json;

fn broker() -> Arc<Broker> {
    Broker::new(BrokerConfig::default())
}

/// Подписывает новую сессию на `path` и возвращает её входящую очередь.
fn subscriber(
    broker: &Broker,
    id: &str,
    path: &str,
) -> (Arc<LocalSession>, Inbox) {
    let (session, inbox) = LocalSession::with_id(id);
    session.handshake();
    assert!(broker.subscribe(&session.session_ref(), path).unwrap());
    (session, inbox)
}

fn received(inbox: &mut Inbox) -> Vec<serde_json::Value> {
    inbox
        .drain()
        .into_iter()
        .map(|d| d.message.data.clone())
        .collect()
}

/// Тест проверяет доставку подписчикам точного канала, `*` и `**`
/// на разных уровнях.
#[rstest]
#[case("/a/b", &["/a/b", "/a/*", "/a/**", "/**"])]
#[case("/a/b/c", &["/a/**", "/**"])]
#[case("/a", &["/*", "/**"])]
#[case("/z", &["/*", "/**"])]
fn test_wildcard_delivery(
    #[case] target: &str,
    #[case] expected: &[&str],
) {
    let broker = broker();
    let patterns = ["/a/b", "/a/*", "/a/**", "/*", "/**", "/a/b/d"];
    let mut inboxes: Vec<_> = patterns
        .iter()
        .enumerate()
        .map(|(i, p)| (*p, subscriber(&broker, &format!("s{i}"), p)))
        .collect();

    let outcome = broker.publish(None, target, json!("hello")).unwrap();
    assert_eq!(outcome, PublishOutcome::Delivered);

    for (pattern, (_session, inbox)) in inboxes.iter_mut() {
        let got = received(inbox);
        if expected.contains(&*pattern) {
            assert_eq!(got, vec![json!("hello")], "{pattern} should receive");
        } else {
            assert!(got.is_empty(), "{pattern} should not receive");
        }
    }
}

/// Тест проверяет порядок вызова слушателей сообщений: `**` сверху вниз,
/// `*` на предпоследнем уровне, затем сам канал.
#[test]
fn test_listener_order() {
    let broker = broker();
    let order = Arc::new(Mutex::new(Vec::new()));

    for path in ["/a/b", "/a/*", "/a/**", "/**", "/*"] {
        let order = order.clone();
        let tag = path.to_string();
        broker
            .channel(path)
            .unwrap()
            .add_listener(Listener::on_message(move |_, _, _| {
                order.lock().unwrap().push(tag.clone());
                true
            }));
    }

    broker.publish(None, "/a/b", json!(1)).unwrap();

    assert_eq!(
        *order.lock().unwrap(),
        vec!["/**", "/a/*", "/a/**", "/a/b"]
    );
}

/// Тест проверяет, что вето любого слушателя отменяет доставку всем
/// подписчикам, включая подписчиков wildcard-каналов.
#[test]
fn test_veto_blocks_all_delivery() {
    let broker = broker();
    let (_s1, mut exact) = subscriber(&broker, "exact", "/a/b");
    let (_s2, mut wild) = subscriber(&broker, "wild", "/a/*");

    broker
        .channel("/a/**")
        .unwrap()
        .add_listener(Listener::on_message(|_, _, m: &mut Message| {
            m.data != json!("forbidden")
        }));

    let outcome = broker.publish(None, "/a/b", json!("forbidden")).unwrap();
    assert_eq!(outcome, PublishOutcome::Vetoed);
    assert!(exact.is_empty());
    assert!(wild.is_empty());
    assert_eq!(broker.stats().vetoed, 1);

    let outcome = broker.publish(None, "/a/b", json!("fine")).unwrap();
    assert!(outcome.is_delivered());
    assert_eq!(received(&mut exact), vec![json!("fine")]);
    assert_eq!(received(&mut wild), vec![json!("fine")]);
}

/// Тест проверяет, что вето на любом уровне (`*`, `**` или сам канал)
/// останавливает вызов следующих слушателей и доставку всем подписчикам:
/// точного канала, `*` и `**`.
#[rstest]
#[case("/a/*", &["/a/*"])]
#[case("/a/**", &["/a/*", "/a/**"])]
#[case("/a/b", &["/a/*", "/a/**", "/a/b"])]
fn test_veto_stops_later_listeners(
    #[case] vetoer: &str,
    #[case] expected_calls: &[&str],
) {
    let broker = broker();
    let mut inboxes: Vec<_> = ["/a/b", "/a/*", "/a/**", "/**"]
        .iter()
        .enumerate()
        .map(|(i, p)| (*p, subscriber(&broker, &format!("s{i}"), p)))
        .collect();

    let calls = Arc::new(Mutex::new(Vec::new()));
    for path in ["/a/*", "/a/**", "/a/b"] {
        let calls = calls.clone();
        let veto = path == vetoer;
        broker
            .channel(path)
            .unwrap()
            .add_listener(Listener::on_message(move |_, _, _| {
                calls.lock().unwrap().push(path);
                !veto
            }));
    }

    let outcome = broker.publish(None, "/a/b", json!("blocked")).unwrap();

    assert_eq!(outcome, PublishOutcome::Vetoed);
    assert_eq!(*calls.lock().unwrap(), expected_calls);
    for (pattern, (_session, inbox)) in inboxes.iter_mut() {
        assert!(received(inbox).is_empty(), "{pattern} should not receive");
    }
}

/// Тест проверяет, что изменения, сделанные слушателями, видят все
/// подписчики, и все получают один и тот же снимок.
#[test]
fn test_listener_mutation_is_delivered() {
    let broker = broker();
    let (_s1, mut exact) = subscriber(&broker, "exact", "/news/today");
    let (_s2, mut deep) = subscriber(&broker, "deep", "/news/**");

    broker
        .channel("/news/*")
        .unwrap()
        .add_listener(Listener::on_message(|_, to: &Arc<ChannelNode>, m: &mut Message| {
            m.data = json!({ "wrapped": m.data.clone(), "to": to.id().as_str() });
            true
        }));

    broker.publish(None, "/news/today", json!(7)).unwrap();

    let a = exact.try_recv().unwrap();
    let b = deep.try_recv().unwrap();
    assert!(Arc::ptr_eq(&a.message, &b.message));
    assert_eq!(a.message.data, json!({ "wrapped": 7, "to": "/news/today" }));
}

/// Тест проверяет, что ленивый флаг наследуется от целевого канала и от
/// wildcard-каналов, через которые проходит публикация.
#[test]
fn test_lazy_propagation() {
    let broker = broker();
    let (_s1, mut inbox) = subscriber(&broker, "s", "/l/**");

    broker.publish(None, "/l/eager", json!(1)).unwrap();
    broker.channel("/l/*").unwrap().set_lazy(true);
    broker.publish(None, "/l/eager", json!(2)).unwrap();
    broker.publish(None, "/l/eager/deeper", json!(3)).unwrap();

    let lazy: Vec<bool> = inbox.drain().iter().map(|d| d.message.is_lazy()).collect();
    assert_eq!(lazy, vec![false, true, false]);
}

struct Echo {
    seen: Mutex<Vec<serde_json::Value>>,
}

impl HandlerListener for Echo {
    fn on_message(
        &self,
        _from: Option<&SessionRef>,
        message: &mut Message,
    ) {
        self.seen.lock().unwrap().push(message.data.clone());
    }
}

/// Тест проверяет, что обработчики meta-каналов вызываются после доставки
/// подписчикам, а на обычных каналах не вызываются.
#[test]
fn test_meta_handlers() {
    let broker = broker();
    let echo = Arc::new(Echo {
        seen: Mutex::new(Vec::new()),
    });

    broker
        .channel("/meta/connect")
        .unwrap()
        .add_listener(Listener::Handler(echo.clone()));
    broker
        .channel("/chat")
        .unwrap()
        .add_listener(Listener::Handler(echo.clone()));

    let (_s, mut inbox) = subscriber(&broker, "observer", "/meta/connect");
    broker.publish(None, "/meta/connect", json!("ping")).unwrap();
    broker.publish(None, "/chat", json!("ignored")).unwrap();

    assert_eq!(received(&mut inbox), vec![json!("ping")]);
    assert_eq!(*echo.seen.lock().unwrap(), vec![json!("ping")]);
}

#[test]
fn test_publish_to_wildcard_node_rejected() {
    let broker = broker();
    let wild = broker.channel("/a/*").unwrap();
    let err = wild.publish(None, Message::new("/a/*", json!(1))).unwrap_err();
    assert_eq!(
        err,
        ChannelError::WildPublishNotAllowed {
            channel: "/a/*".into()
        }
    );

    let deep = broker.channel("/a/**").unwrap();
    assert!(deep.publish_data(None, json!(1), None).is_err());
}

/// Тест проверяет, что `publish_data` заполняет канал, отправителя и id, а
/// подписчик видит отправителя.
#[test]
fn test_publish_data_fills_envelope() {
    let broker = broker();
    let (_s, mut inbox) = subscriber(&broker, "reader", "/feed");
    let (writer, _writer_inbox) = LocalSession::with_id("writer");
    writer.handshake();
    let writer_ref: SessionRef = writer.session_ref();

    broker
        .channel("/feed")
        .unwrap()
        .publish_data(Some(&writer_ref), json!({ "n": 1 }), Some("m-1".into()))
        .unwrap();

    let delivery = inbox.try_recv().unwrap();
    assert_eq!(delivery.from.as_deref(), Some("writer"));
    assert_eq!(delivery.message.channel, "/feed");
    assert_eq!(delivery.message.client_id.as_deref(), Some("writer"));
    assert_eq!(delivery.message.id.as_deref(), Some("m-1"));
}

/// Тест проверяет, что расширение может изменить или отбросить сообщение
/// до маршрутизации.
#[test]
fn test_extensions() {
    let broker = broker();
    let (_s, mut inbox) = subscriber(&broker, "s", "/ext");

    let stamp = extension(|_, m: &mut Message| {
        m.id = Some("stamped".into());
        true
    });
    broker.add_extension(stamp.clone());
    broker.add_extension(extension(|_, m: &mut Message| m.data != json!("spam")));

    assert_eq!(
        broker.publish(None, "/ext", json!("spam")).unwrap(),
        PublishOutcome::Dropped
    );
    broker.publish(None, "/ext", json!("ham")).unwrap();

    let deliveries = inbox.drain();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].message.id.as_deref(), Some("stamped"));

    assert!(broker.remove_extension(&stamp));
    broker.publish(None, "/ext", json!("plain")).unwrap();
    assert_eq!(inbox.try_recv().unwrap().message.id, None);
}

/// Тест проверяет, что если целевой канал удалён во время фазы
/// слушателей, публикация никому не доставляется.
#[test]
fn test_target_removed_during_publish_is_unrouted() {
    let broker = broker();
    let (_s, mut inbox) = subscriber(&broker, "s", "/x/**");
    let target = broker.channel("/x/y").unwrap();
    broker.get_channel("/x").unwrap().set_persistent(true);

    let victim = target.clone();
    broker
        .channel("/**")
        .unwrap()
        .add_listener(Listener::on_message(move |_, _, _| {
            victim.remove();
            true
        }));

    let outcome = target.publish(None, Message::new("/x/y", json!(1))).unwrap();
    assert_eq!(outcome, PublishOutcome::Unrouted);
    assert!(inbox.is_empty());
}

/// Тест проверяет, что подписчик не получает сообщение после отписки и
/// что публикация в канал без подписчиков не ошибка.
#[test]
fn test_no_delivery_after_unsubscribe() {
    let broker = broker();
    let (session, mut inbox) = subscriber(&broker, "s", "/t");
    broker.channel("/t").unwrap().set_persistent(true);

    broker.unsubscribe(&session.session_ref(), "/t").unwrap();
    let outcome = broker.publish(None, "/t", json!(1)).unwrap();

    assert!(outcome.is_delivered());
    assert!(inbox.is_empty());
}
