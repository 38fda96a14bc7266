use crate::application::service::{BatchProcessor, PendingCheckout};
use crate::domain::port::CheckoutStore;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// バッチウィンドウの設定
#[derive(Debug, Clone)]
pub struct WindowerConfig {
    /// ウィンドウを締める間隔
    pub tick_interval: Duration,
    /// 1バッチの上限件数。`None` なら件数では締めない
    pub max_batch_size: Option<usize>,
}

impl Default for WindowerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(300),
            max_batch_size: None,
        }
    }
}

/// バッチウィンドウ
///
/// 受付キューの唯一の読み手。ティックごとにバッファを締めて処理器へ渡す。
/// 処理中はキューを読まないので、新しい要求はキューで待つ。
pub struct BatchWindower<S: CheckoutStore> {
    receiver: mpsc::Receiver<PendingCheckout>,
    processor: BatchProcessor<S>,
    config: WindowerConfig,
    buffer: Vec<PendingCheckout>,
    deliveries: Vec<JoinHandle<()>>,
}

impl<S: CheckoutStore> BatchWindower<S> {
    pub fn new(
        receiver: mpsc::Receiver<PendingCheckout>,
        processor: BatchProcessor<S>,
        config: WindowerConfig,
    ) -> Self {
        Self {
            receiver,
            processor,
            config,
            buffer: Vec::new(),
            deliveries: Vec::new(),
        }
    }

    /// ウィンドウのループを実行する
    ///
    /// `shutdown` がキャンセルされるか、送信側がすべて破棄されると、
    /// キューに残った要求も含めて最後のバッチを処理し、配信の完了を待って戻る。
    #[tracing::instrument(skip_all, name = "batch_windower")]
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 最初のティックは即時に完了するので読み捨てる
        ticker.tick().await;

        info!(
            tick_ms = self.config.tick_interval.as_millis() as u64,
            max_batch_size = ?self.config.max_batch_size,
            "Batch windower started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.flush().await;
                }
                received = self.receiver.recv() => match received {
                    Some(pending) => {
                        self.buffer.push(pending);
                        if self.is_full() {
                            self.flush().await;
                            ticker.reset();
                        }
                    }
                    None => {
                        debug!("All checkout senders dropped");
                        break;
                    }
                },
            }
        }

        self.drain().await;
        for handle in std::mem::take(&mut self.deliveries) {
            // 配信タスクは panic しない
            let _ = handle.await;
        }
        info!("Batch windower stopped");
    }

    fn is_full(&self) -> bool {
        self.config
            .max_batch_size
            .is_some_and(|max| max > 0 && self.buffer.len() >= max)
    }

    /// キューを閉じ、残った要求をバッファへ移して最後のバッチを処理する
    async fn drain(&mut self) {
        self.receiver.close();
        while let Ok(pending) = self.receiver.try_recv() {
            self.buffer.push(pending);
        }
        if !self.buffer.is_empty() {
            info!(pending = self.buffer.len(), "Flushing remaining checkouts before shutdown");
        }
        self.flush().await;
    }

    /// バッファを締めて処理する。空なら何もしない
    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.buffer);
        let handles = self.processor.process(batch).await;
        self.deliveries.retain(|handle| !handle.is_finished());
        self.deliveries.extend(handles);
    }
}
