use ns_core::{Error, NewsApi, Result, Topic, TopicRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::key::QueryKey;
use crate::queries::{TOPIC, TOPICS};
use crate::store::QueryStore;

pub const DEFAULT_LANGUAGE: &str = "en";

/// Languages a topic search can target, as (code, display name).
pub const LANGUAGES: [(&str, &str); 8] = [
    ("en", "English"),
    ("ru", "Russian"),
    ("hy", "Armenian"),
    ("de", "German"),
    ("fr", "French"),
    ("es", "Spanish"),
    ("zh", "Chinese"),
    ("ar", "Arabic"),
];

/// Display name for a language code. Unknown codes are shown as given.
pub fn language_name(code: &str) -> &str {
    LANGUAGES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map_or(code, |&(_, name)| name)
}

/// Splits comma separated keyword input, dropping blanks.
pub fn parse_keywords(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Editable state of the topic form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicForm {
    pub name: String,
    /// Raw comma separated input.
    pub keywords: String,
    pub global_search: bool,
    pub language: String,
    pub source_ids: Vec<i64>,
}

impl Default for TopicForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            keywords: String::new(),
            global_search: true,
            language: DEFAULT_LANGUAGE.to_string(),
            source_ids: Vec::new(),
        }
    }
}

impl TopicForm {
    /// Prefills the form for editing `topic`.
    pub fn from_topic(topic: &Topic) -> Self {
        Self {
            name: topic.name.clone(),
            keywords: topic.keywords.join(", "),
            global_search: topic.global_search,
            language: topic
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            source_ids: topic.source_ids.clone().unwrap_or_default(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Validates the form and builds the request body.
    pub fn to_request(&self) -> Result<TopicRequest> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Topic name is required".to_string()));
        }
        let keywords = parse_keywords(&self.keywords);
        if keywords.is_empty() {
            return Err(Error::Validation("At least one keyword is required".to_string()));
        }
        Ok(TopicRequest {
            name: name.to_string(),
            keywords,
            source_ids: (!self.source_ids.is_empty()).then(|| self.source_ids.clone()),
            global_search: Some(self.global_search),
            language: Some(self.language.clone()),
        })
    }
}

/// Clears the pending flag when the mutation finishes, however it ends.
struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Topic writes followed by invalidation of every cached topic query.
#[derive(Clone)]
pub struct TopicMutations {
    api: Arc<dyn NewsApi>,
    store: QueryStore,
    pending: Arc<AtomicBool>,
}

impl TopicMutations {
    pub fn new(api: Arc<dyn NewsApi>, store: QueryStore) -> Self {
        Self {
            api,
            store,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True while a mutation is in flight; submit controls stay disabled.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<PendingGuard<'_>> {
        if self.pending.swap(true, Ordering::SeqCst) {
            return Err(Error::Validation("Another change is still being saved".to_string()));
        }
        Ok(PendingGuard(&self.pending))
    }

    /// Creates a topic from `form`. The form is reset on success and left
    /// untouched on failure.
    pub async fn create(&self, form: &mut TopicForm) -> Result<Topic> {
        let request = form.to_request()?;
        let _pending = self.begin()?;
        match self.api.create_topic(&request).await {
            Ok(topic) => {
                info!("📌 Created topic #{} {:?}", topic.id, topic.name);
                self.invalidate(None);
                form.reset();
                Ok(topic)
            }
            Err(err) => {
                warn!("❌ Creating topic {:?} failed: {}", request.name, err);
                Err(err)
            }
        }
    }

    pub async fn update(&self, id: i64, form: &mut TopicForm) -> Result<Topic> {
        let request = form.to_request()?;
        let _pending = self.begin()?;
        match self.api.update_topic(id, &request).await {
            Ok(topic) => {
                info!("✏️ Updated topic #{}", id);
                self.invalidate(Some(id));
                form.reset();
                Ok(topic)
            }
            Err(err) => {
                warn!("❌ Updating topic #{} failed: {}", id, err);
                Err(err)
            }
        }
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let _pending = self.begin()?;
        match self.api.delete_topic(id).await {
            Ok(()) => {
                info!("🗑️ Deleted topic #{}", id);
                self.invalidate(Some(id));
                Ok(())
            }
            Err(err) => {
                warn!("❌ Deleting topic #{} failed: {}", id, err);
                Err(err)
            }
        }
    }

    fn invalidate(&self, id: Option<i64>) {
        self.store.invalidate(&QueryKey::new(TOPICS));
        if let Some(id) = id {
            self.store.invalidate(&QueryKey::new(TOPIC).with_param("id", id));
        }
    }
}
