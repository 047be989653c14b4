use amqprs::{
    callbacks::{DefaultChannelCallback, DefaultConnectionCallback},
    channel::{
        BasicAckArguments, BasicConsumeArguments, BasicNackArguments, BasicPublishArguments, Channel,
        ExchangeDeclareArguments, QueueDeclareArguments,
    },
    connection::{Connection, OpenConnectionArguments},
    consumer::AsyncConsumer,
    BasicProperties, Deliver, FieldTable,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AmqpConfig;
use crate::db::DbPool;
use crate::error::ServiceError;
use crate::meetings::{self, Transition};
use crate::models::{Meeting, MeetingStatus};
use crate::slots::local_now;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

const EVENTS_EXCHANGE: &str = "meeting.events";
const COMPLETION_QUEUE: &str = "meeting.completions";
const COMPLETION_TIMER_QUEUE: &str = "meeting.completion.timer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingEventKind {
    Requested,
    Accepted,
    Rejected,
    Cancelled,
    Completed,
    Expired,
}

impl MeetingEventKind {
    pub fn routing_key(&self) -> &'static str {
        match self {
            MeetingEventKind::Requested => "meeting.requested",
            MeetingEventKind::Accepted => "meeting.accepted",
            MeetingEventKind::Rejected => "meeting.rejected",
            MeetingEventKind::Cancelled => "meeting.cancelled",
            MeetingEventKind::Completed => "meeting.completed",
            MeetingEventKind::Expired => "meetings.expired",
        }
    }
}

impl From<Transition> for MeetingEventKind {
    fn from(t: Transition) -> Self {
        match t {
            Transition::Accept => MeetingEventKind::Accepted,
            Transition::Reject => MeetingEventKind::Rejected,
            Transition::Cancel => MeetingEventKind::Cancelled,
            Transition::Complete => MeetingEventKind::Completed,
            Transition::Expire => MeetingEventKind::Expired,
        }
    }
}

/// Lifecycle notification for the external notification service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingEvent {
    pub kind: MeetingEventKind,
    pub meeting_ids: Vec<i32>,
    pub buyer_id: Option<i32>,
    pub seller_id: Option<i32>,
    pub requestor_id: Option<i32>,
    pub status: Option<MeetingStatus>,
    pub occurred_at: DateTime<Utc>,
}

impl MeetingEvent {
    pub fn for_meeting(kind: MeetingEventKind, meeting: &Meeting) -> Self {
        Self {
            kind,
            meeting_ids: vec![meeting.id],
            buyer_id: Some(meeting.buyer_id),
            seller_id: Some(meeting.seller_id),
            requestor_id: Some(meeting.requestor_id),
            status: Some(meeting.status),
            occurred_at: Utc::now(),
        }
    }

    pub fn expired(meeting_ids: Vec<i32>) -> Self {
        Self {
            kind: MeetingEventKind::Expired,
            meeting_ids,
            buyer_id: None,
            seller_id: None,
            requestor_id: None,
            status: Some(MeetingStatus::Cancelled),
            occurred_at: Utc::now(),
        }
    }
}

// Dead-lettered into the completion queue once the slot has ended
#[derive(Debug, Serialize, Deserialize)]
struct CompletionMessage {
    meeting_id: i32,
    due_at: NaiveDateTime,
}

/// Milliseconds until `due`, or `None` when it has already passed.
fn delay_until(due: NaiveDateTime, now: NaiveDateTime) -> Option<i64> {
    let ms = (due - now).num_milliseconds();
    (ms > 0).then_some(ms)
}

fn persistent() -> BasicProperties {
    BasicProperties::default()
        .with_delivery_mode(2)
        .with_content_type("application/json")
        .finish()
}

struct MeetingCompletionConsumer {
    db_pool: DbPool,
}

#[async_trait::async_trait]
impl AsyncConsumer for MeetingCompletionConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        if let Err(e) = self.handle_completion(channel, deliver, content).await {
            error!("Failed to process meeting completion: {:?}", e);
        }
    }
}

impl MeetingCompletionConsumer {
    async fn handle_completion(&mut self, channel: &Channel, deliver: Deliver, content: Vec<u8>) -> Result<()> {
        let message = match serde_json::from_slice::<CompletionMessage>(&content) {
            Ok(message) => message,
            Err(e) => {
                error!("Dropping malformed completion message: {:?}", e);
                channel
                    .basic_nack(BasicNackArguments::new(deliver.delivery_tag(), false, false))
                    .await?;
                return Err(e.into());
            }
        };

        let pool = self.db_pool.clone();
        let meeting_id = message.meeting_id;
        let outcome = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            meetings::mark_completed(&mut conn, meeting_id, None)
        })
        .await?;

        match outcome {
            Ok(meeting) => {
                info!("Meeting {} completed after its slot ended at {}", meeting.id, message.due_at);
                let event = MeetingEvent::for_meeting(MeetingEventKind::Completed, &meeting);
                let body = serde_json::to_vec(&event)?;
                let args = BasicPublishArguments::new(EVENTS_EXCHANGE, event.kind.routing_key());
                if let Err(e) = channel.basic_publish(persistent(), body, args).await {
                    warn!("Could not publish completion of meeting {}: {:?}", meeting.id, e);
                }
                channel
                    .basic_ack(BasicAckArguments::new(deliver.delivery_tag(), false))
                    .await?;
            }
            // Cancelled or removed before its slot ended; nothing left to do.
            Err(ServiceError::Conflict(_)) | Err(ServiceError::NotFound(_)) => {
                debug!("Meeting {} no longer completable, dropping timer", meeting_id);
                channel
                    .basic_ack(BasicAckArguments::new(deliver.delivery_tag(), false))
                    .await?;
            }
            Err(e) => {
                error!("Completing meeting {} failed, requeueing: {}", meeting_id, e);
                channel
                    .basic_nack(BasicNackArguments::new(deliver.delivery_tag(), false, true))
                    .await?;
                return Err(e.into());
            }
        }
        Ok(())
    }
}

/// Publishes meeting lifecycle events and drives automatic completion.
///
/// Broker failures never reach the caller: the database transaction is already committed
/// when anything is published.
#[derive(Clone)]
pub struct MeetingEventService {
    db_pool: DbPool,
    config: AmqpConfig,
    connection: Option<Arc<Connection>>,
}

impl MeetingEventService {
    pub fn new(db_pool: DbPool, config: AmqpConfig) -> Self {
        Self {
            db_pool,
            config,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub async fn initialize(&mut self) -> Result<()> {
        if !self.config.enabled {
            info!("AMQP disabled, meeting events will not be published");
            return Ok(());
        }

        info!("Connecting to RabbitMQ at {}:{}", self.config.host, self.config.port);
        let connection = Connection::open(&OpenConnectionArguments::new(
            &self.config.host,
            self.config.port,
            &self.config.user,
            &self.config.password,
        ))
        .await?;
        connection.register_callback(DefaultConnectionCallback).await?;

        let setup_channel = connection.open_channel(None).await?;
        setup_channel.register_callback(DefaultChannelCallback).await?;

        setup_channel
            .exchange_declare(
                ExchangeDeclareArguments::new(EVENTS_EXCHANGE, "topic")
                    .durable(true)
                    .finish(),
            )
            .await?;

        setup_channel
            .queue_declare(QueueDeclareArguments::new(COMPLETION_QUEUE).durable(true).finish())
            .await?;

        // Expired timers go through the default exchange straight into the completion queue.
        let mut args = FieldTable::new();
        args.insert("x-dead-letter-exchange".try_into()?, "".into());
        args.insert("x-dead-letter-routing-key".try_into()?, COMPLETION_QUEUE.into());
        setup_channel
            .queue_declare(
                QueueDeclareArguments::new(COMPLETION_TIMER_QUEUE)
                    .durable(true)
                    .arguments(args)
                    .finish(),
            )
            .await?;

        let _ = setup_channel.close().await;
        self.connection = Some(Arc::new(connection));
        info!("Connected to RabbitMQ and declared meeting queues");
        Ok(())
    }

    async fn get_fresh_channel(&self) -> Result<Channel> {
        match &self.connection {
            Some(connection) => {
                let channel = connection.open_channel(None).await?;
                channel.register_callback(DefaultChannelCallback).await?;
                Ok(channel)
            }
            None => Err("RabbitMQ connection not initialized".into()),
        }
    }

    // Retries with backoff, then logs and gives up
    async fn safe_queue_operation<F, Fut>(&self, what: &str, operation: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let max_retries = 3;
        let mut delay_ms = 25;

        for attempt in 1..=max_retries {
            match operation().await {
                Ok(()) => return,
                Err(e) if attempt < max_retries => {
                    warn!("{} failed (attempt {}/{}), retrying: {:?}", what, attempt, max_retries, e);
                    tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    delay_ms *= 2;
                }
                Err(e) => {
                    error!("{} failed after {} attempts, giving up: {:?}", what, max_retries, e);
                }
            }
        }
    }

    async fn publish_raw(&self, exchange: &str, routing_key: &str, body: Vec<u8>, properties: BasicProperties) -> Result<()> {
        let channel = self.get_fresh_channel().await?;
        channel
            .basic_publish(properties, body, BasicPublishArguments::new(exchange, routing_key))
            .await?;
        let _ = channel.close().await;
        Ok(())
    }

    pub async fn publish(&self, event: MeetingEvent) {
        if !self.is_connected() {
            debug!("Skipping {} event, broker not connected", event.kind.routing_key());
            return;
        }
        let body = match serde_json::to_vec(&event) {
            Ok(body) => body,
            Err(e) => {
                error!("Could not serialize meeting event: {:?}", e);
                return;
            }
        };

        let key = event.kind.routing_key();
        self.safe_queue_operation(key, || self.publish_raw(EVENTS_EXCHANGE, key, body.clone(), persistent()))
            .await;
        debug!("Published {} for meetings {:?}", key, event.meeting_ids);
    }

    /// Arms a timer that completes the meeting once `ends_at` (local wall clock) has passed.
    pub async fn schedule_completion(&self, meeting_id: i32, ends_at: NaiveDateTime) {
        if !self.is_connected() {
            debug!("Skipping completion timer for meeting {}, broker not connected", meeting_id);
            return;
        }
        let body = match serde_json::to_vec(&CompletionMessage {
            meeting_id,
            due_at: ends_at,
        }) {
            Ok(body) => body,
            Err(e) => {
                error!("Could not serialize completion timer: {:?}", e);
                return;
            }
        };

        match delay_until(ends_at, local_now()) {
            Some(ttl_ms) => {
                self.safe_queue_operation("completion timer", || {
                    let properties = BasicProperties::default()
                        .with_delivery_mode(2)
                        .with_content_type("application/json")
                        .with_expiration(&ttl_ms.to_string())
                        .finish();
                    self.publish_raw("", COMPLETION_TIMER_QUEUE, body.clone(), properties)
                })
                .await;
                info!("Meeting {} will complete at {} (in {}ms)", meeting_id, ends_at, ttl_ms);
            }
            None => {
                self.safe_queue_operation("completion", || {
                    self.publish_raw("", COMPLETION_QUEUE, body.clone(), persistent())
                })
                .await;
            }
        }
    }

    pub async fn start_consuming_completions(&self) -> Result<()> {
        let channel = self.get_fresh_channel().await?;
        let consumer_tag = format!("meeting_completion_consumer_{}", Uuid::new_v4());
        let args = BasicConsumeArguments::new(COMPLETION_QUEUE, &consumer_tag)
            .manual_ack(true)
            .finish();
        let consumer = MeetingCompletionConsumer {
            db_pool: self.db_pool.clone(),
        };

        tokio::spawn(async move {
            match channel.basic_consume(consumer, args).await {
                Ok(_) => {
                    info!("Meeting completion consumer started on {}", COMPLETION_QUEUE);
                    // The channel must outlive the consumer.
                    loop {
                        tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
                    }
                }
                Err(e) => error!("Failed to start meeting completion consumer: {:?}", e),
            }
        });
        Ok(())
    }
}
