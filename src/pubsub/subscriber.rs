use std::sync::Arc;

use globset::Glob;
use tokio::sync::broadcast::{self, error::RecvError};

use super::Message;
use crate::error::BusError;

/// Подписка на конкретный канал по имени.
///
/// Отписка происходит автоматически при `Drop`.
pub struct Subscription {
    /// Название канала, на который подписаны.
    pub channel: Arc<str>,
    /// Внутренний приёмник для входящих сообщений.
    pub(crate) inner: broadcast::Receiver<Message>,
}

/// Подписка на каналы по glob-паттерну.
///
/// Отписка происходит автоматически при `Drop`.
pub struct PatternSubscription {
    /// Шаблон glob для сопоставления имён каналов.
    pub pattern: Glob,
    /// Внутренний приёмник для входящих сообщений.
    pub(crate) inner: broadcast::Receiver<Message>,
}

fn map_recv(err: RecvError) -> BusError {
    match err {
        RecvError::Closed => BusError::Closed,
        RecvError::Lagged(skipped) => BusError::Lagged { skipped },
    }
}

impl Subscription {
    /// Асинхронно ожидает следующее сообщение из канала.
    ///
    /// # Возвращает
    /// - `Ok(Message)` при успешном получении сообщения
    /// - `Err(BusError::Closed)` если канал закрыт
    /// - `Err(BusError::Lagged { skipped })` если приёмник отстал
    pub async fn recv(&mut self) -> Result<Message, BusError> {
        self.inner.recv().await.map_err(map_recv)
    }

    /// Явно отписаться от канала. Аналогично `drop(self)`.
    pub fn unsubscribe(self) {}
}

impl PatternSubscription {
    /// Асинхронно ожидает следующее сообщение, соответствующее паттерну.
    pub async fn recv(&mut self) -> Result<Message, BusError> {
        self.inner.recv().await.map_err(map_recv)
    }

    /// Явно отписаться от шаблона.
    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::time::timeout;

    use super::*;
    use crate::pubsub::Broker;

    /// Тест проверяет, что после удаления брокера подписка получает `Closed`.
    #[tokio::test]
    async fn test_subscription_outlives_broker() {
        let mut sub = {
            let broker = Broker::new(10);
            broker.subscribe("mychan")
        };
        assert_eq!(&*sub.channel, "mychan");
        assert_eq!(sub.recv().await.unwrap_err(), BusError::Closed);
    }

    /// Тест проверяет, что дроп подписки уменьшает счётчик слушателей.
    #[test]
    fn test_unsubscribe_drops_receiver() {
        let (tx, rx) = broadcast::channel(5);
        let sub = Subscription {
            channel: Arc::from("foo"),
            inner: rx,
        };
        assert_eq!(tx.receiver_count(), 1);
        sub.unsubscribe();
        assert_eq!(tx.receiver_count(), 0);
    }

    /// Тест проверяет, что отставший подписчик получает `Lagged` и затем
    /// продолжает читать.
    #[tokio::test]
    async fn test_lagged_subscriber_recovers() {
        let broker = Broker::new(2);
        let mut sub = broker.subscribe("lag");
        for i in 0..5u8 {
            broker.publish("lag", Bytes::from(vec![i]));
        }
        assert_eq!(sub.recv().await.unwrap_err(), BusError::Lagged { skipped: 3 });
        let msg = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timed out")
            .expect("no message");
        assert_eq!(msg.payload, Bytes::from(vec![3u8]));
    }

    /// Тест проверяет, что после отписки от шаблона публикация никому не
    /// доставляется.
    #[tokio::test]
    async fn test_pattern_unsubscribe_stops_delivery() {
        let broker = Broker::new(10);
        let psub = broker.psubscribe("bar*").unwrap();
        assert_eq!(broker.publish("barbaz", Bytes::from_static(b"yes")), 1);
        psub.unsubscribe();
        assert_eq!(broker.publish("barbaz", Bytes::from_static(b"nope")), 0);
        assert!(!broker.has_subscribers("barbaz"));
    }
}
