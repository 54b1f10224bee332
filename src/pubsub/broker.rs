use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bytes::Bytes;
use dashmap::DashMap;
use globset::{Glob, GlobMatcher};
use tokio::sync::broadcast;

use super::{Message, PatternSubscription, Subscription};
use crate::error::BusError;

type ChannelKey = Arc<str>;

/// Снимок счётчиков брокера.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Общее количество вызовов `publish`.
    pub published: u64,
    /// Публикации в точный канал, у которого не осталось подписчиков.
    pub undelivered: u64,
    /// Количество живых точных каналов.
    pub channels: usize,
}

/// Зарегистрированный шаблон: скомпилированный matcher и его `Sender`.
struct PatternEntry {
    glob: Glob,
    matcher: GlobMatcher,
    tx: broadcast::Sender<Message>,
}

/// Брокер Pub/Sub сообщений.
///
/// Поддерживает:
/// - Точные подписки по имени канала
/// - Подписки по шаблонам (glob)
/// - Автоматическое удаление пустых каналов
/// - Статистику публикаций и ошибок отправки
///
/// Доставка at-most-once: сообщение получают только подписчики,
/// подключённые в момент публикации, повторов нет.
pub struct Broker {
    /// Точные каналы → `Sender`
    channels: DashMap<ChannelKey, broadcast::Sender<Message>>,
    /// Шаблоны каналов (по исходной строке)
    patterns: DashMap<String, PatternEntry>,
    /// Ёмкость буфера каждого `broadcast::channel`
    default_capacity: usize,
    /// Общее количество вызовов `publish`
    publish_count: AtomicU64,
    /// Количество неудачных `send` (нет подписчиков)
    send_error_count: AtomicU64,
}

impl Broker {
    /// Создаёт новый `Broker` с заданной буферной ёмкостью.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            patterns: DashMap::new(),
            default_capacity: default_capacity.max(1),
            publish_count: AtomicU64::new(0),
            send_error_count: AtomicU64::new(0),
        }
    }

    /// Подписка по шаблону (glob), например `"telemetry:*:update"`.
    ///
    /// Повторная подписка на тот же шаблон получит тот же `Sender`.
    pub fn psubscribe(
        &self,
        pattern: &str,
    ) -> Result<PatternSubscription, BusError> {
        let glob = Glob::new(pattern).map_err(|e| BusError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let entry = self
            .patterns
            .entry(pattern.to_string())
            .or_insert_with(|| PatternEntry {
                matcher: glob.compile_matcher(),
                glob: glob.clone(),
                tx: broadcast::channel(self.default_capacity).0,
            });
        Ok(PatternSubscription {
            pattern: entry.glob.clone(),
            inner: entry.tx.subscribe(),
        })
    }

    /// Подписка на конкретный канал (точное совпадение).
    pub fn subscribe(
        &self,
        channel: &str,
    ) -> Subscription {
        let key: Arc<str> = Arc::from(channel);
        let tx = self
            .channels
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(self.default_capacity).0)
            .clone();
        Subscription {
            channel: key,
            inner: tx.subscribe(),
        }
    }

    /// Публикация сообщения в канал.
    ///
    /// Работает в два этапа:
    /// 1. Отправляет в точный канал (если есть)
    /// 2. Отправляет всем подписчикам по шаблонам
    ///
    /// Если в точном канале нет подписчиков, увеличивает `send_error_count`
    /// и удаляет канал. Возвращает число получателей.
    pub fn publish(
        &self,
        channel: &str,
        payload: Bytes,
    ) -> usize {
        self.publish_count.fetch_add(1, Ordering::Relaxed);
        let mut delivered = 0;

        // 1) точное совпадение
        let exact = self.channels.get(channel).map(|e| (e.key().clone(), e.value().clone()));
        if let Some((key, tx)) = exact {
            match tx.send(Message::new(key.clone(), payload.clone())) {
                Ok(n) => delivered += n,
                Err(_) => {
                    self.send_error_count.fetch_add(1, Ordering::Relaxed);
                }
            }
            if tx.receiver_count() == 0 {
                self.channels.remove_if(&key, |_, tx| tx.receiver_count() == 0);
            }
        }

        // 2) по шаблону
        let channel: Arc<str> = Arc::from(channel);
        for entry in self.patterns.iter() {
            if entry.matcher.is_match(&*channel) {
                if let Ok(n) = entry.tx.send(Message::new(channel.clone(), payload.clone())) {
                    delivered += n;
                }
            }
        }

        delivered
    }

    /// Есть ли у канала хотя бы один слушатель (точный или по шаблону).
    pub fn has_subscribers(
        &self,
        channel: &str,
    ) -> bool {
        let exact = self
            .channels
            .get(channel)
            .is_some_and(|tx| tx.receiver_count() > 0);
        exact
            || self
                .patterns
                .iter()
                .any(|e| e.tx.receiver_count() > 0 && e.matcher.is_match(channel))
    }

    /// Удаляет все подписки на указанный канал (и сам канал).
    ///
    /// Подписчики получат `Closed`; следующая `publish` не создаст канал
    /// заново.
    pub fn unsubscribe_all(
        &self,
        channel: &str,
    ) {
        self.channels.remove(channel);
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            published: self.publish_count.load(Ordering::Relaxed),
            undelivered: self.send_error_count.load(Ordering::Relaxed),
            channels: self.channels.len(),
        }
    }
}
