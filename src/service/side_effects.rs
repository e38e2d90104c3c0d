use tokio::sync::mpsc;
use uuid::Uuid;

/// Post-success side effects. None of these may block or fail the payment
/// flow; the financial fact of success is already committed when they run.
#[derive(Debug, Clone)]
pub enum SideEffect {
    ReceiptGeneration {
        transaction_id: Uuid,
    },
    ConfirmationEmail {
        transaction_id: Uuid,
        email: String,
        course_title: String,
    },
    RealtimePush {
        student_id: String,
        course_id: String,
    },
}

impl SideEffect {
    fn kind(&self) -> &'static str {
        match self {
            SideEffect::ReceiptGeneration { .. } => "receipt",
            SideEffect::ConfirmationEmail { .. } => "email",
            SideEffect::RealtimePush { .. } => "realtime",
        }
    }
}

/// Bounded queue with a single worker task; a full or closed queue degrades to
/// a log line.
#[derive(Clone)]
pub struct SideEffectQueue {
    tx: mpsc::Sender<SideEffect>,
}

impl SideEffectQueue {
    pub fn start(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(worker(rx));
        Self { tx }
    }

    pub fn enqueue(&self, effect: SideEffect) {
        if let Err(err) = self.tx.try_send(effect) {
            tracing::warn!("side-effect queue rejected item: {err}");
        }
    }
}

async fn worker(mut rx: mpsc::Receiver<SideEffect>) {
    while let Some(effect) = rx.recv().await {
        let kind = effect.kind();
        if let Err(err) = dispatch(effect).await {
            tracing::error!(kind, "side effect failed (payment state unaffected): {err:#}");
        }
    }
}

// Rendering and delivery are owned by other services; only the hand-over
// happens here.
async fn dispatch(effect: SideEffect) -> anyhow::Result<()> {
    match effect {
        SideEffect::ReceiptGeneration { transaction_id } => {
            tracing::info!(%transaction_id, "receipt generation requested");
        }
        SideEffect::ConfirmationEmail {
            transaction_id,
            email,
            course_title,
        } => {
            tracing::info!(%transaction_id, email, course_title, "confirmation email requested");
        }
        SideEffect::RealtimePush { student_id, course_id } => {
            tracing::info!(student_id, course_id, "realtime enrollment push requested");
        }
    }
    Ok(())
}
