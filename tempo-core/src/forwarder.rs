//! Drives an [IngressPipeline] from a channel of raw events and writes its two outputs to channels.
//! For every input event the diagnostics of that push are written first, then the released events.
//! When the input ends (or the cancellation token fires) the pipeline is closed, so the last event
//! on the output channel is the terminal punctuation, after which both senders are dropped.
//! Cancellation is only observed between two pushes.

use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::message::{Diagnostic, OutputEvent, RawEvent};
use crate::pipeline::IngressPipeline;

pub struct IngressForwarder<T> {
    pipeline: IngressPipeline<T>,
    output_tx: Sender<OutputEvent<T>>,
    diagnostics_tx: Option<Sender<Diagnostic<T>>>,
    cancellation_token: CancellationToken,
}

impl<T> IngressForwarder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        pipeline: IngressPipeline<T>,
        output_tx: Sender<OutputEvent<T>>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            output_tx,
            diagnostics_tx: None,
            cancellation_token,
        }
    }

    /// Routes the pipeline's diagnostics to `diagnostics_tx`.
    pub fn with_diagnostics(mut self, diagnostics_tx: Sender<Diagnostic<T>>) -> Self {
        if !self.pipeline.diagnostics_subscribed() {
            warn!(
                name = %self.pipeline.config().name,
                "Diagnostics channel attached but the pipeline is not subscribed to diagnostics"
            );
        }
        self.diagnostics_tx = Some(diagnostics_tx);
        self
    }

    /// Spawns the forwarding loop. The returned handle resolves once the output is complete or the
    /// pipeline failed.
    pub fn start(self, input: ReceiverStream<RawEvent<T>>) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(input).await })
    }

    async fn run(mut self, mut input: ReceiverStream<RawEvent<T>>) -> Result<()> {
        let mut forwarded = 0usize;
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    info!(name = %self.pipeline.config().name, "Cancellation received, closing the pipeline");
                    break;
                }
                event = input.next() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let emitted = match self.pipeline.push(event) {
                Ok(emitted) => emitted,
                Err(e) => {
                    error!(name = %self.pipeline.config().name, ?e, "Ingress pipeline failed");
                    return Err(e);
                }
            };
            self.send_diagnostics().await?;
            forwarded += emitted.len();
            self.send_events(emitted).await?;
        }

        let emitted = self.pipeline.close()?;
        forwarded += emitted.len();
        self.send_events(emitted).await?;

        info!(name = %self.pipeline.config().name, ?forwarded, "Ingress forwarder completed");
        Ok(())
    }

    async fn send_diagnostics(&mut self) -> Result<()> {
        let diagnostics = self.pipeline.take_diagnostics();
        let Some(diagnostics_tx) = &self.diagnostics_tx else {
            return Ok(());
        };
        for diagnostic in diagnostics {
            diagnostics_tx
                .send(diagnostic)
                .await
                .map_err(|_| Error::Forwarder("diagnostics receiver dropped".to_string()))?;
        }
        Ok(())
    }

    async fn send_events(&self, events: Vec<OutputEvent<T>>) -> Result<()> {
        for event in events {
            self.output_tx
                .send(event)
                .await
                .map_err(|_| Error::Forwarder("output receiver dropped".to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DisorderPolicy, IngressConfig, PunctuationPolicy};
    use crate::message::INFINITY;
    use tokio::sync::mpsc;

    fn config(disorder: DisorderPolicy) -> IngressConfig {
        IngressConfig::new(disorder)
            .with_name("forwarder-tests")
            .with_punctuation(PunctuationPolicy::Periodic(10))
            .with_diagnostics(true)
    }

    #[tokio::test]
    async fn test_forwards_in_order_and_ends_with_infinity() {
        let pipeline = IngressPipeline::new(config(DisorderPolicy::Drop(5))).unwrap();
        let (input_tx, input_rx) = mpsc::channel(10);
        let (output_tx, output_rx) = mpsc::channel(10);
        let (diagnostics_tx, diagnostics_rx) = mpsc::channel(10);

        let handle = IngressForwarder::new(pipeline, output_tx, CancellationToken::new())
            .with_diagnostics(diagnostics_tx)
            .start(ReceiverStream::new(input_rx));

        for t in [12, 8, 15, 3, 20] {
            input_tx.send(RawEvent::start_edge(t, t)).await.unwrap();
        }
        drop(input_tx);

        let output: Vec<OutputEvent<i64>> = ReceiverStream::new(output_rx).collect().await;
        handle.await.unwrap().unwrap();

        let data: Vec<i64> = output
            .iter()
            .filter(|e| !e.is_punctuation())
            .map(|e| e.sync_time())
            .collect();
        assert_eq!(data, vec![8, 12, 15, 20]);
        assert_eq!(
            output.last(),
            Some(&OutputEvent::Punctuation {
                sync_time: INFINITY
            })
        );

        let diagnostics: Vec<Diagnostic<i64>> =
            ReceiverStream::new(diagnostics_rx).collect().await;
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].event.start_time, 3);
        assert!(diagnostics[0].is_drop());
    }

    #[tokio::test]
    async fn test_fatal_disorder_stops_the_forwarder() {
        let pipeline = IngressPipeline::new(config(DisorderPolicy::Throw(5))).unwrap();
        let (input_tx, input_rx) = mpsc::channel(10);
        let (output_tx, output_rx) = mpsc::channel(10);

        let handle = IngressForwarder::new(pipeline, output_tx, CancellationToken::new())
            .start(ReceiverStream::new(input_rx));

        for t in [12, 3] {
            input_tx.send(RawEvent::start_edge(t, t)).await.unwrap();
        }

        let result = handle.await.unwrap();
        assert_eq!(
            result,
            Err(Error::FatalDisorder {
                start_time: 3,
                cutoff: 7
            })
        );

        // no terminal punctuation after a failure
        let output: Vec<OutputEvent<i64>> = ReceiverStream::new(output_rx).collect().await;
        assert!(output.iter().all(|e| e.sync_time() != INFINITY));
    }

    #[tokio::test]
    async fn test_cancellation_closes_the_pipeline() {
        let pipeline = IngressPipeline::new(config(DisorderPolicy::Adjust(100))).unwrap();
        let (input_tx, input_rx) = mpsc::channel(10);
        let (output_tx, mut output_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let handle = IngressForwarder::new(pipeline, output_tx, cancel.clone())
            .start(ReceiverStream::new(input_rx));

        input_tx.send(RawEvent::start_edge(30, 30)).await.unwrap();
        input_tx.send(RawEvent::start_edge(10, 10)).await.unwrap();
        // wait till both events are pushed, the lag holds them back
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();

        let mut output = Vec::new();
        while let Some(event) = output_rx.recv().await {
            output.push(event);
        }
        handle.await.unwrap().unwrap();

        assert_eq!(
            output,
            vec![
                OutputEvent::StartEdge {
                    start_time: 10,
                    payload: 10
                },
                OutputEvent::Punctuation { sync_time: 10 },
                OutputEvent::StartEdge {
                    start_time: 30,
                    payload: 30
                },
                OutputEvent::Punctuation { sync_time: 30 },
                OutputEvent::Punctuation {
                    sync_time: INFINITY
                },
            ]
        );
        // the input sender is still alive, the forwarder stopped on its own
        assert!(input_tx.is_closed());
    }

    #[tokio::test]
    async fn test_dropped_output_receiver_is_an_error() {
        let pipeline = IngressPipeline::new(config(DisorderPolicy::Drop(0))).unwrap();
        let (input_tx, input_rx) = mpsc::channel(10);
        let (output_tx, output_rx) = mpsc::channel(10);
        drop(output_rx);

        let handle = IngressForwarder::new(pipeline, output_tx, CancellationToken::new())
            .start(ReceiverStream::new(input_rx));
        input_tx.send(RawEvent::start_edge(1, 1)).await.unwrap();

        assert!(matches!(handle.await.unwrap(), Err(Error::Forwarder(_))));
    }
}
