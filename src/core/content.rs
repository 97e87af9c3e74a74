//! Public content APIs: jokes, activity suggestions and subreddit memes
//!
//! All of them go through the response cache. Jokes and activities always
//! produce something; when the API gives nothing usable a canned fallback is
//! picked instead. Memes report why nothing could be found.

use crate::config::Settings;
use crate::core::http_cache::{FetchRequest, ResponseCache};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Duration;

const REDDIT_WEB: &str = "https://www.reddit.com";
const IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];

pub const JOKE_CATEGORIES: [&str; 6] = ["Programming", "Misc", "Dark", "Spooky", "Christmas", "Any"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Joke {
    Single(String),
    TwoPart { setup: String, delivery: String },
}

impl Joke {
    fn from_api(value: &Value) -> Self {
        let text = |key: &str, default: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_string()
        };

        if value.get("type").and_then(Value::as_str) == Some("twopart") {
            Joke::TwoPart {
                setup: text("setup", "No setup found"),
                delivery: text("delivery", "No punchline found"),
            }
        } else {
            Joke::Single(text("joke", "No joke found"))
        }
    }

    fn fallbacks() -> Vec<Joke> {
        vec![
            Joke::Single(
                "Why do programmers prefer dark mode? Because light attracts bugs.".to_string(),
            ),
            Joke::TwoPart {
                setup: "What do you call a programmer from Finland?".to_string(),
                delivery: "Nerdic.".to_string(),
            },
            Joke::TwoPart {
                setup: "What's a programmer's favorite hangout place?".to_string(),
                delivery: "Foo Bar.".to_string(),
            },
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub activity: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub participants: Option<u32>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub accessibility: f64,
}

impl Activity {
    fn fallbacks() -> Vec<Activity> {
        [
            ("Learn a new programming language", "education", 0.0, 0.1),
            ("Start a book club", "social", 0.1, 0.2),
            ("Go for a walk in nature", "recreational", 0.0, 0.0),
        ]
        .into_iter()
        .map(|(activity, kind, price, accessibility)| Activity {
            activity: activity.to_string(),
            kind: kind.to_string(),
            participants: None,
            price,
            accessibility,
        })
        .collect()
    }
}

/// A hot image post from a subreddit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meme {
    pub title: String,
    pub image_url: String,
    pub permalink: String,
    pub ups: i64,
    pub comments: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemeError {
    #[error("Could not fetch posts from r/{0}. It might be private, banned, or have no posts.")]
    Unavailable(String),

    #[error("Couldn't find any image posts on r/{0} right now.")]
    NoImages(String),
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: RedditPost,
}

#[derive(Debug, Deserialize)]
struct RedditPost {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    stickied: bool,
    #[serde(default)]
    ups: i64,
    #[serde(default)]
    num_comments: u64,
}

impl RedditPost {
    fn is_image(&self) -> bool {
        let url = self.url.to_ascii_lowercase();
        IMAGE_EXTENSIONS.iter().any(|ext| url.ends_with(ext))
    }

    fn into_meme(self, subreddit: &str) -> Meme {
        Meme {
            title: self
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| format!("From r/{}", subreddit)),
            image_url: self.url,
            permalink: format!("{}{}", REDDIT_WEB, self.permalink),
            ups: self.ups,
            comments: self.num_comments,
        }
    }
}

/// Accepts `memes`, `r/memes` or `/r/memes`; `None` for anything that
/// cannot be a subreddit name.
pub fn normalize_subreddit(subreddit: &str) -> Option<&str> {
    let name = subreddit.trim().trim_start_matches('/');
    let name = name
        .strip_prefix("r/")
        .or_else(|| name.strip_prefix("R/"))
        .unwrap_or(name);
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}

/// Capitalizes and validates a joke category, defaulting to `Any`.
pub fn normalize_category(category: &str) -> &'static str {
    JOKE_CATEGORIES
        .iter()
        .find(|known| known.eq_ignore_ascii_case(category.trim()))
        .copied()
        .unwrap_or("Any")
}

pub struct ContentClient {
    cache: ResponseCache,
    joke_url: String,
    activity_url: String,
    reddit_url: String,
    joke_ttl: Duration,
    activity_ttl: Duration,
    meme_ttl: Duration,
    joke_timeout: Duration,
    activity_timeout: Duration,
    meme_timeout: Duration,
}

impl ContentClient {
    pub fn new(cache: ResponseCache, settings: &Settings) -> Self {
        Self {
            cache,
            joke_url: "https://v2.jokeapi.dev/joke".to_string(),
            activity_url: "http://www.boredapi.com/api/activity".to_string(),
            reddit_url: REDDIT_WEB.to_string(),
            joke_ttl: Duration::from_secs(settings.cache.joke_ttl_secs),
            activity_ttl: Duration::from_secs(settings.cache.activity_ttl_secs),
            meme_ttl: Duration::from_secs(settings.cache.meme_ttl_secs),
            joke_timeout: Duration::from_secs(settings.api_timeouts.joke_api),
            activity_timeout: Duration::from_secs(settings.api_timeouts.activity_api),
            meme_timeout: Duration::from_secs(settings.api_timeouts.meme_api),
        }
    }

    /// Points both APIs somewhere else, e.g. a local mock.
    pub fn with_base_urls(mut self, joke_url: impl Into<String>, activity_url: impl Into<String>) -> Self {
        self.joke_url = joke_url.into();
        self.activity_url = activity_url.into();
        self
    }

    pub fn with_reddit_url(mut self, reddit_url: impl Into<String>) -> Self {
        self.reddit_url = reddit_url.into();
        self
    }

    pub async fn joke(&self, category: &str) -> Joke {
        let category = normalize_category(category);
        let request = FetchRequest::get(format!("{}/{}", self.joke_url.trim_end_matches('/'), category))
            .with_ttl(self.joke_ttl)
            .with_timeout(self.joke_timeout);

        match self.cache.fetch(request).await.and_then(|p| p.into_json()) {
            Some(value) => Joke::from_api(&value),
            None => {
                tracing::warn!("Joke API gave no data for '{}', using a fallback", category);
                pick(Joke::fallbacks())
            }
        }
    }

    pub async fn activity(&self, participants: u32) -> Activity {
        let participants = participants.clamp(1, 10);
        let request = FetchRequest::get(&self.activity_url)
            .with_param("participants", participants)
            .with_ttl(self.activity_ttl)
            .with_timeout(self.activity_timeout);

        let parsed = self
            .cache
            .fetch(request)
            .await
            .and_then(|p| p.into_json())
            .and_then(|value| serde_json::from_value::<Activity>(value).ok());

        match parsed {
            Some(activity) => activity,
            None => {
                tracing::warn!("Activity API gave no data, using a fallback");
                pick(Activity::fallbacks())
            }
        }
    }

    /// A random non-stickied image post from the subreddit's hot listing.
    pub async fn meme(&self, subreddit: &str) -> Result<Meme, MemeError> {
        let Some(subreddit) = normalize_subreddit(subreddit) else {
            return Err(MemeError::Unavailable(subreddit.trim().to_string()));
        };

        let request = FetchRequest::get(format!(
            "{}/r/{}/hot.json",
            self.reddit_url.trim_end_matches('/'),
            subreddit
        ))
        .with_header("User-Agent", concat!("demented/", env!("CARGO_PKG_VERSION")))
        .with_ttl(self.meme_ttl)
        .with_timeout(self.meme_timeout);

        let listing = self
            .cache
            .fetch(request)
            .await
            .and_then(|p| p.into_json())
            .and_then(|value| serde_json::from_value::<Listing>(value).ok())
            .filter(|listing| !listing.data.children.is_empty());

        let Some(listing) = listing else {
            tracing::warn!("Failed to get valid data from r/{}", subreddit);
            return Err(MemeError::Unavailable(subreddit.to_string()));
        };

        let posts: Vec<RedditPost> = listing
            .data
            .children
            .into_iter()
            .map(|child| child.data)
            .filter(|post| !post.stickied && post.is_image())
            .collect();

        if posts.is_empty() {
            return Err(MemeError::NoImages(subreddit.to_string()));
        }
        Ok(pick(posts).into_meme(subreddit))
    }
}

// Callers always pass a non-empty list of fallbacks.
fn pick<T>(mut options: Vec<T>) -> T {
    let index = rand::random_range(0..options.len());
    options.swap_remove(index)
}
