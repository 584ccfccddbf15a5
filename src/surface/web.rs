//! Browser-backed surface: the four operator capabilities over WebDriver,
//! driven by the selectors in a [`PlatformConfig`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, Locator};
use tracing::{debug, info, warn};

use crate::conversation::{Conversation, ConversationId, Message, Sender};
use crate::error::{AuthError, Fault, WebDriverError};
use crate::operator::Clock;
use crate::platform::PlatformConfig;
use crate::surface::{
    Authenticator, ConversationPoller, ConversationReader, MessageSender, PollResult,
};

/// Max chars of item text used as a fallback conversation id.
const TEXT_ID_LEN: usize = 50;

/// Pause between typing and clicking send, for the UI to catch up.
const TYPE_SETTLE: Duration = Duration::from_millis(500);

/// Interval between logged-in checks while waiting for a manual login.
const LOGIN_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Interval between lookups while waiting for an element.
const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Implements every operator capability against one browser tab.
pub struct WebSurface {
    client: Client,
    platform: PlatformConfig,
    clock: Arc<dyn Clock>,
    /// Ids listed by the previous poll.
    seen: Mutex<HashSet<ConversationId>>,
    /// How long `poll` / `read` / `send` wait for elements to appear.
    element_wait: Duration,
}

impl WebSurface {
    pub fn new(client: Client, platform: PlatformConfig, clock: Arc<dyn Clock>) -> Self {
        let element_wait = platform.wait_timeouts.element_visible();
        Self {
            client,
            platform,
            clock,
            seen: Mutex::new(HashSet::new()),
            element_wait,
        }
    }

    pub fn platform(&self) -> &PlatformConfig {
        &self.platform
    }

    /// End the browser session.
    pub async fn close(&self) -> Result<(), WebDriverError> {
        self.client.clone().close().await?;
        info!("WebDriver session closed");
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Element>, WebDriverError> {
        Ok(self.client.find_all(Locator::Css(selector)).await?)
    }

    /// Poll for the first element matching `selector` until `wait` runs out.
    async fn wait_for(&self, selector: &str, wait: Duration) -> Result<Element, WebDriverError> {
        let started = self.clock.now();
        loop {
            if let Some(element) = self.find_all(selector).await?.into_iter().next() {
                return Ok(element);
            }
            let waited = (self.clock.now() - started).to_std().unwrap_or_default();
            if waited >= wait {
                debug!(selector, waited_ms = waited.as_millis() as u64, "Element did not appear");
                return Err(WebDriverError::ElementNotFound {
                    selector: selector.to_string(),
                    waited: wait,
                });
            }
            self.clock.sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    async fn is_logged_in(&self) -> Result<bool, WebDriverError> {
        let items = self.find_all(&self.platform.selectors.conversation_list).await?;
        Ok(!items.is_empty())
    }

    /// Conversation list items with their derived ids, in list order.
    async fn list_conversations(&self) -> Result<Vec<(ConversationId, Element)>, WebDriverError> {
        let items = self.find_all(&self.platform.selectors.conversation_list).await?;

        let mut listed = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            let id = conversation_id(&item, idx).await?;
            listed.push((id, item));
        }
        Ok(listed)
    }

    /// Bubbles for one sender, paired with their vertical position.
    async fn collect_bubbles(
        &self,
        selector: &str,
        sender: Sender,
        into: &mut Vec<(f64, Message)>,
    ) -> Result<(), WebDriverError> {
        for bubble in self.find_all(selector).await? {
            let text = bubble.text().await?;
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let (_, y, _, _) = bubble.rectangle().await?;
            into.push((y, Message::new(sender, text, self.clock.now())));
        }
        Ok(())
    }
}

async fn conversation_id(item: &Element, idx: usize) -> Result<ConversationId, WebDriverError> {
    if let Some(id) = item
        .attr("data-id")
        .await?
        .filter(|id| !id.trim().is_empty())
    {
        return Ok(ConversationId::new(id));
    }

    let text = item.text().await?;
    let prefix: String = text.trim().chars().take(TEXT_ID_LEN).collect();
    if prefix.is_empty() {
        Ok(ConversationId::new(format!("conv_{idx}")))
    } else {
        Ok(ConversationId::new(prefix))
    }
}

#[async_trait]
impl Authenticator for WebSurface {
    async fn ensure_authenticated(&self, max_wait: Duration) -> Result<(), AuthError> {
        let platform = &self.platform.platform_name;
        let unreachable = |e: WebDriverError| AuthError::Unreachable {
            platform: platform.clone(),
            reason: e.to_string(),
        };
        info!(platform = %platform, url = %self.platform.url, "Ensuring authentication");

        self.client
            .goto(&self.platform.url)
            .await
            .map_err(|e| unreachable(e.into()))?;

        // A logged-in page shows the conversation list once it has loaded.
        let page_load = self.platform.wait_timeouts.page_load();
        match self
            .wait_for(&self.platform.selectors.conversation_list, page_load)
            .await
        {
            Ok(_) => {
                info!(platform = %platform, "Authenticated");
                return Ok(());
            }
            Err(e) if e.is_unreachable() => return Err(unreachable(e)),
            Err(e) => debug!(error = %e, "Conversation list not visible after page load"),
        }

        warn!(
            platform = %platform,
            seconds = max_wait.as_secs(),
            "Manual login required, complete it in the browser window"
        );
        let started = self.clock.now();
        loop {
            match self.is_logged_in().await {
                Ok(true) => {
                    info!(platform = %platform, "Authenticated");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) if e.is_unreachable() => return Err(unreachable(e)),
                Err(e) => debug!(error = %e, "Login check failed"),
            }

            let waited = (self.clock.now() - started).to_std().unwrap_or_default();
            if waited >= max_wait {
                return Err(AuthError::TimedOut {
                    platform: platform.clone(),
                    waited: max_wait,
                });
            }
            self.clock.sleep(LOGIN_CHECK_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ConversationPoller for WebSurface {
    async fn poll_once(&self) -> Result<PollResult, Fault> {
        let listed = self
            .list_conversations()
            .await
            .map_err(|e| e.into_fault("poll"))?;

        let mut result = PollResult::default();
        if listed.is_empty() {
            warn!("No conversation elements found");
            return Ok(result);
        }

        let mut current = HashSet::with_capacity(listed.len());
        for (id, item) in &listed {
            let unread = item
                .find_all(Locator::Css(&self.platform.selectors.unread_indicator))
                .await
                .map_err(|e| WebDriverError::from(e).into_fault("poll"))?;
            if !unread.is_empty() {
                result.unread.push(id.clone());
            }
            if current.insert(id.clone()) {
                result.new_or_updated.push(id.clone());
            }
        }

        match self.seen.lock() {
            Ok(mut seen) => {
                result.new_or_updated.retain(|id| !seen.contains(id));
                result.gone = seen.difference(&current).cloned().collect();
                result.gone.sort();
                *seen = current;
            }
            Err(_) => return Err(Fault::transient("poll", "seen-set lock poisoned")),
        }

        if !result.unread.is_empty() {
            info!(unread = result.unread.len(), "Found conversations with unread messages");
        }
        debug!(
            listed = listed.len(),
            new = result.new_or_updated.len(),
            gone = result.gone.len(),
            "Polled conversation list"
        );
        Ok(result)
    }
}

#[async_trait]
impl ConversationReader for WebSurface {
    async fn read(&self, id: &ConversationId) -> Result<Conversation, Fault> {
        let fault = |e: WebDriverError| e.into_fault("read");

        let listed = self.list_conversations().await.map_err(fault)?;
        let Some((_, item)) = listed.into_iter().find(|(listed_id, _)| listed_id == id) else {
            return Err(Fault::ConversationGone(id.clone()));
        };
        item.click().await.map_err(|e| fault(e.into()))?;

        let selectors = &self.platform.selectors;
        self.wait_for(&selectors.input_field, self.element_wait)
            .await
            .map_err(fault)?;

        let mut bubbles = Vec::new();
        self.collect_bubbles(&selectors.message_bubble_user, Sender::User, &mut bubbles)
            .await
            .map_err(fault)?;
        if let Some(bot) = &selectors.message_bubble_bot {
            self.collect_bubbles(bot, Sender::Bot, &mut bubbles)
                .await
                .map_err(fault)?;
        }
        bubbles.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut conversation = Conversation::new(id.clone(), &self.platform.platform_name);
        conversation.messages = bubbles.into_iter().map(|(_, m)| m).collect();
        if let Some(last) = conversation.last_message() {
            conversation.last_message_at = last.sent_at;
        }

        info!(conversation = %id, messages = conversation.messages.len(), "Read conversation");
        Ok(conversation)
    }
}

#[async_trait]
impl MessageSender for WebSurface {
    async fn prepare(&self, text: &str) -> Result<(), Fault> {
        let fault = |e: WebDriverError| e.into_fault("send");

        let input = self
            .wait_for(&self.platform.selectors.input_field, self.element_wait)
            .await
            .map_err(fault)?;

        // contenteditable inputs may reject clear
        if let Err(e) = input.clear().await {
            warn!(error = %e, "Could not clear input field");
        }
        input.send_keys(text).await.map_err(|e| fault(e.into()))?;
        self.clock.sleep(TYPE_SETTLE).await;
        Ok(())
    }

    async fn commit(&self) -> Result<(), Fault> {
        let fault = |e: WebDriverError| e.into_fault("send");

        let button = self
            .wait_for(&self.platform.selectors.send_button, self.element_wait)
            .await
            .map_err(fault)?;
        button.click().await.map_err(|e| fault(e.into()))?;
        info!("Message sent");
        Ok(())
    }

    async fn settle(&self) {
        self.clock
            .sleep(self.platform.wait_timeouts.message_send())
            .await;
    }
}
