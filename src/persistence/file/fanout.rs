// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Round-robin fan-out of one event stream across shard channels.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::event::Event;

/// Distribute every item from `input` to output `counter % N`, in strict
/// counter order. Not load-based: a slow shard back-pressures the whole
/// persistence path instead of buffering without bound. When the input is
/// exhausted all outputs are dropped, which closes the shard channels.
/// With zero outputs the router just drains the input.
pub(crate) fn fanout_round_robin(
    mut input: mpsc::Receiver<Arc<Event>>,
    outputs: Vec<mpsc::Sender<Arc<Event>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if outputs.is_empty() {
            while input.recv().await.is_some() {}
            return;
        }

        let mut next = 0usize;
        while let Some(ev) = input.recv().await {
            if outputs[next].send(ev).await.is_err() {
                tracing::warn!(shard = next, "shard channel gone, event dropped");
            }
            next = (next + 1) % outputs.len();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_robin_distribution() {
        let worker_count = 10;
        let work_count = 1000;

        let (input_tx, input_rx) = mpsc::channel(100);
        let mut outputs: Vec<mpsc::Sender<Arc<Event>>> = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..worker_count {
            let (tx, rx) = mpsc::channel(1);
            outputs.push(tx);
            receivers.push(rx);
        }

        let mut collectors = Vec::new();
        for mut rx in receivers {
            collectors.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(ev) = rx.recv().await {
                    seen.push(ev.time);
                }
                seen
            }));
        }

        let router = fanout_round_robin(input_rx, outputs);
        for i in 0..work_count {
            input_tx.send(Arc::new(Event::new("t", i))).await.unwrap();
        }
        drop(input_tx);
        router.await.unwrap();

        for (idx, collector) in collectors.into_iter().enumerate() {
            let seen = collector.await.unwrap();
            assert_eq!(seen.len(), (work_count / worker_count) as usize);
            // channel idx gets input positions idx, idx+N, idx+2N, ...
            for (round, time) in seen.iter().enumerate() {
                assert_eq!(*time, idx as i64 + (round as i64) * worker_count as i64);
            }
        }
    }

    #[tokio::test]
    async fn test_zero_outputs_drains_input() {
        let (input_tx, input_rx) = mpsc::channel(10);
        let router = fanout_round_robin(input_rx, Vec::new());

        for i in 0..100 {
            input_tx.send(Arc::new(Event::new("t", i))).await.unwrap();
        }
        drop(input_tx);
        router.await.unwrap();
    }
}
