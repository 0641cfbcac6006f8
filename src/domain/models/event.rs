// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::record::Record;
use crate::utils::errors::SourceError;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// 数据源事件
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// 一批数据记录
    Data(Vec<Record>),
    /// 错误通知，不会终止事件流
    Error(SourceError),
    /// 终止事件
    End,
}

impl SourceEvent {
    pub fn is_end(&self) -> bool {
        matches!(self, SourceEvent::End)
    }
}

/// 创建事件通道
///
/// 发送端可以复制给多个任务；接收端保证恰好产出一次 `End`：
/// - 任意发送端调用 `end` 后，后续事件全部丢弃
/// - 所有发送端被丢弃而没有调用 `end` 时，接收端补发 `End`
pub fn event_channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, EventStream { rx: Some(rx) })
}

/// 事件发送端
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SourceEvent>,
}

impl EventSink {
    /// 发送一批数据
    ///
    /// # 返回值
    ///
    /// 接收端已经结束时返回 `false`
    pub fn data(&self, records: Vec<Record>) -> bool {
        self.tx.send(SourceEvent::Data(records)).is_ok()
    }

    /// 发送错误
    pub fn error(&self, error: impl Into<SourceError>) -> bool {
        self.tx.send(SourceEvent::Error(error.into())).is_ok()
    }

    /// 发送终止事件
    pub fn end(self) {
        let _ = self.tx.send(SourceEvent::End);
    }

    /// 接收端是否已经结束
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// 等待接收端结束
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// 事件接收端
#[derive(Debug)]
pub struct EventStream {
    rx: Option<mpsc::UnboundedReceiver<SourceEvent>>,
}

impl EventStream {
    /// 立即结束的空事件流
    pub fn empty() -> Self {
        let (sink, stream) = event_channel();
        sink.end();
        stream
    }

    /// 是否已经产出终止事件
    pub fn is_terminated(&self) -> bool {
        self.rx.is_none()
    }
}

impl Stream for EventStream {
    type Item = SourceEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(None);
        };

        match rx.poll_recv(cx) {
            Poll::Ready(Some(SourceEvent::End)) | Poll::Ready(None) => {
                // Dropping the receiver discards anything sent after the terminal event
                self.rx = None;
                Poll::Ready(Some(SourceEvent::End))
            }
            other => other,
        }
    }
}
