//! Core request classification types.
//!
//! These are the small value types that a [`RequestConfig`](crate::RequestConfig)
//! is made of: scheduling [`Priority`], the [`RequestKind`], the
//! [`ResponseShape`] the caller wants back, the [`CacheControl`] directive handed
//! to the transport, and the caller-supplied grouping [`Tag`].

use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Scheduling priority of a request.
///
/// `Immediate` requests run on a dedicated pool; every other class shares the
/// normal network pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Background traffic
    Low,
    /// Default priority
    #[default]
    Medium,
    /// Elevated, still on the shared pool
    High,
    /// Low-latency pool, never queued behind bulk traffic
    Immediate,
}

impl Priority {
    /// Whether this priority is routed to the immediate pool.
    #[inline]
    pub fn is_immediate(self) -> bool {
        matches!(self, Priority::Immediate)
    }
}

/// What the request does on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestKind {
    /// Plain request/response call
    #[default]
    Simple,
    /// Stream the response body into `dir/file_name`
    Download {
        /// Target directory, created if missing
        dir: PathBuf,
        /// Target file name inside `dir`
        file_name: String,
    },
    /// `multipart/form-data` upload
    Multipart,
}

impl RequestKind {
    /// Whether this kind moves a potentially large body to or from disk.
    pub fn is_transfer(&self) -> bool {
        !matches!(self, RequestKind::Simple)
    }
}

/// The shape the caller wants the successful body delivered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseShape {
    /// UTF-8 body as a `String`
    Text,
    /// Body parsed as a JSON object
    JsonObject,
    /// Body parsed as a JSON array
    JsonArray,
    /// Body decoded by the client's image decoder
    Image,
    /// The transport response itself, body unread
    Raw,
    /// Body parsed by the client's parser strategy into a caller type
    Parsed,
    /// Body drained and discarded (cache warm-up)
    Prefetch,
    /// Body written to the download target
    Download,
}

/// Cache directive handed to the transport as a `Cache-Control` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// Do not store the response
    pub no_store: bool,
    /// Always revalidate with the network
    pub no_cache: bool,
    /// Only answer from cache
    pub only_if_cached: bool,
    /// Accept cached responses at most this old
    pub max_age: Option<Duration>,
    /// Accept stale cached responses up to this age
    pub max_stale: Option<Duration>,
}

impl CacheControl {
    /// Do not cache the response.
    pub fn no_store() -> Self {
        CacheControl {
            no_store: true,
            ..Default::default()
        }
    }

    /// Answer only from the network.
    pub fn force_network() -> Self {
        CacheControl {
            no_cache: true,
            ..Default::default()
        }
    }

    /// Answer only from the cache, however stale.
    pub fn force_cache() -> Self {
        CacheControl {
            only_if_cached: true,
            max_stale: Some(Duration::from_secs(i32::MAX as u64)),
            ..Default::default()
        }
    }

    /// Render as a `Cache-Control` header value.
    ///
    /// ```
    /// use relay_http::CacheControl;
    ///
    /// assert_eq!(CacheControl::no_store().header_value(), "no-store");
    /// assert_eq!(
    ///     CacheControl::force_cache().header_value(),
    ///     "only-if-cached, max-stale=2147483647"
    /// );
    /// ```
    pub fn header_value(&self) -> String {
        let mut parts = Vec::new();
        if self.no_cache {
            parts.push("no-cache".to_string());
        }
        if self.no_store {
            parts.push("no-store".to_string());
        }
        if self.only_if_cached {
            parts.push("only-if-cached".to_string());
        }
        if let Some(max_age) = self.max_age {
            parts.push(format!("max-age={}", max_age.as_secs()));
        }
        if let Some(max_stale) = self.max_stale {
            parts.push(format!("max-stale={}", max_stale.as_secs()));
        }
        parts.join(", ")
    }

    /// Whether no directive is set.
    pub fn is_empty(&self) -> bool {
        self.header_value().is_empty()
    }
}

/// Object-safe equality over arbitrary tag values.
trait TagValue: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn eq_value(&self, other: &dyn TagValue) -> bool;
}

impl<T> TagValue for T
where
    T: PartialEq + Any + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_value(&self, other: &dyn TagValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }
}

/// Caller-supplied grouping key used to cancel or query related requests.
///
/// Two tags match when they hold the same type and that type's `PartialEq`
/// says they are equal. String tags are normalized to `String`, so
/// `Tag::from("login")` matches `Tag::from(String::from("login"))`.
///
/// ```
/// use relay_http::Tag;
///
/// #[derive(Debug, PartialEq)]
/// struct Screen(u32);
///
/// assert_eq!(Tag::from("login"), Tag::from(String::from("login")));
/// assert_eq!(Tag::new(Screen(1)), Tag::new(Screen(1)));
/// assert_ne!(Tag::new(Screen(1)), Tag::new(Screen(2)));
/// assert_ne!(Tag::new(1u32), Tag::from("1"));
/// ```
#[derive(Clone)]
pub struct Tag(Arc<dyn TagValue>);

impl Tag {
    /// Wrap any comparable value as a tag.
    pub fn new<T>(value: T) -> Self
    where
        T: PartialEq + Any + Send + Sync + fmt::Debug,
    {
        Tag(Arc::new(value))
    }

    /// Borrow the tag as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_any().downcast_ref::<String>().map(String::as_str)
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_value(other.0.as_ref())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:?})", self.0)
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Tag::new(value.to_string())
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        Tag::new(value)
    }
}
