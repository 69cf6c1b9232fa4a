//! Tests for the verdict mailbox and the job queue

use tokio_util::sync::CancellationToken;

use slotwatch::core::{Job, Verdict, VerifierError};
use slotwatch::infra::{JobQueue, VerdictMailbox};

#[tokio::test]
async fn test_recv_ends_when_senders_drop() {
    let (tx, mut rx) = VerdictMailbox::channel(2);
    let token = CancellationToken::new();
    assert!(tx.post(Verdict::new(4, true, 2), &token).await);
    drop(tx);

    assert_eq!(rx.recv().await, Some(Verdict::new(4, true, 2)));
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn test_try_post_reports_full_mailbox() {
    let (tx, mut rx) = VerdictMailbox::channel(1);
    assert!(tx.try_post(Verdict::failed(0, 1)));
    assert!(!tx.try_post(Verdict::failed(1, 1)));
    assert_eq!(rx.drain(), vec![Verdict::failed(0, 1)]);
}

#[tokio::test]
async fn test_job_queue_waiter_wakes_on_submit() {
    let queue = JobQueue::new();
    let waiter = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.next().await.map(|job| job.slot_id) })
    };
    tokio::task::yield_now().await;

    let (job, _rx) = Job::new(6, "/tmp/slot_6.jpg");
    queue.submit(job).unwrap();
    assert_eq!(waiter.await.unwrap(), Some(6));
}

#[tokio::test]
async fn test_closed_job_queue_rejects_and_releases_waiters() {
    let queue = JobQueue::new();
    let (pending, pending_rx) = Job::new(0, "/tmp/slot_0.jpg");
    queue.submit(pending).unwrap();

    queue.close();

    assert!(pending_rx.await.is_err());
    assert!(queue.next().await.is_none());
    let (late, _rx) = Job::new(1, "/tmp/slot_1.jpg");
    assert!(matches!(queue.submit(late), Err(VerifierError::QueueClosed(_))));
}
