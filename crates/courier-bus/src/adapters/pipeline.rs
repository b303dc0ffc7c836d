//! # Step Pipeline
//!
//! An ordered list of [`IncomingStep`]s. Each step receives the transaction
//! context explicitly; the first failing step ends the invocation.
//!
//! The usual arrangement is [`DeserializeStep`] followed by a
//! [`HandlerStep`]:
//!
//! ```ignore
//! let pipeline = StepPipeline::new()
//!     .with_step(DeserializeStep::new(Arc::new(JsonSerializer)))
//!     .with_step(HandlerStep::new(Arc::new(MyHandler)));
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use courier_types::LogicalMessage;
use tracing::trace;

use crate::domain::{TransactionContext, LOGICAL_MESSAGE_KEY};
use crate::error::PipelineError;
use crate::ports::{PipelineInvoker, Serializer};

/// One stage of incoming-message processing.
#[async_trait]
pub trait IncomingStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, context: &TransactionContext) -> Result<(), PipelineError>;
}

/// Application code handling one deserialized message.
///
/// Use [`BusHandle::from_context`](crate::BusHandle::from_context) to send
/// or reply from here.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        message: &LogicalMessage,
        context: &TransactionContext,
    ) -> Result<(), PipelineError>;
}

/// Runs its steps in order.
#[derive(Default, Clone)]
pub struct StepPipeline {
    steps: Vec<Arc<dyn IncomingStep>>,
}

impl StepPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    #[must_use]
    pub fn with_step(mut self, step: impl IncomingStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Names of the steps, in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl PipelineInvoker for StepPipeline {
    async fn invoke(&self, context: &TransactionContext) -> Result<(), PipelineError> {
        for step in &self.steps {
            trace!(step = step.name(), context = %context.id(), "Running step");
            step.process(context).await?;
        }
        Ok(())
    }
}

/// Turns the inbound transport message into a [`LogicalMessage`] stored
/// under [`LOGICAL_MESSAGE_KEY`].
pub struct DeserializeStep {
    serializer: Arc<dyn Serializer>,
}

impl DeserializeStep {
    pub fn new(serializer: Arc<dyn Serializer>) -> Self {
        Self { serializer }
    }
}

#[async_trait]
impl IncomingStep for DeserializeStep {
    fn name(&self) -> &'static str {
        "deserialize"
    }

    async fn process(&self, context: &TransactionContext) -> Result<(), PipelineError> {
        let inbound = context.inbound_message()?;
        let logical = self.serializer.deserialize(&inbound)?;
        context.set_item(LOGICAL_MESSAGE_KEY, logical);
        Ok(())
    }
}

/// Passes the deserialized message to a [`MessageHandler`].
pub struct HandlerStep {
    handler: Arc<dyn MessageHandler>,
}

impl HandlerStep {
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl IncomingStep for HandlerStep {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    async fn process(&self, context: &TransactionContext) -> Result<(), PipelineError> {
        let message = context.get_item::<LogicalMessage>(LOGICAL_MESSAGE_KEY)?;
        self.handler.handle(&message, context).await
    }
}
