use std::sync::Arc;

use bytes::Bytes;

/// A raw message as it travels through the broker.
#[derive(Debug, Clone)]
pub struct Message {
    pub channel: Arc<str>,
    pub payload: Bytes,
}

impl Message {
    pub fn new(
        channel: impl Into<Arc<str>>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет создание сообщения с &str и &[u8]
    #[test]
    fn test_message_creation_with_str_and_bytes() {
        let msg = Message::new("news", Bytes::from_static(b"hello world"));
        assert_eq!(&*msg.channel, "news");
        assert_eq!(msg.payload, Bytes::from_static(b"hello world"));
    }

    /// Тест проверяет, что бинарный payload сохраняется без изменений
    #[test]
    fn test_message_with_binary_payload() {
        let msg = Message::new(String::from("bin"), vec![0u8, 255, 128]);
        assert_eq!(&*msg.channel, "bin");
        assert_eq!(&msg.payload[..], &[0u8, 255, 128]);
    }
}
