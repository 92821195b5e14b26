// Lookup diagnostics - classifies yt-dlp error output
//
// Turns the raw stderr of a failed lookup into a reason the shell can
// explain, plus a short list of things the user can try.

use serde::{Deserialize, Serialize};

/// Why YouTube (or the network) refused to hand out a catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingReason {
    /// HTTP 403 Forbidden
    Http403Forbidden,
    /// 429 or explicit rate limiting
    RateLimited,
    /// Captcha / "unusual traffic" / bot check
    BotDetection,
    /// Needs a signed-in, 18+ account
    AgeRestricted,
    PrivateVideo,
    /// Deleted, removed or otherwise gone
    VideoUnavailable,
    GeoBlocked,
    /// DRM, Premium-only or paid content
    DrmProtected,
    MembersOnly,
    /// Connection refused, unreachable host, socket timeout
    NetworkTimeout,
    Unknown,
}

impl BlockingReason {
    /// No settings change will make the download work
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::DrmProtected | Self::VideoUnavailable)
    }

    pub fn cookies_might_help(&self) -> bool {
        matches!(
            self,
            Self::Http403Forbidden
                | Self::AgeRestricted
                | Self::BotDetection
                | Self::PrivateVideo
                | Self::MembersOnly
        )
    }

    pub fn proxy_might_help(&self) -> bool {
        matches!(
            self,
            Self::Http403Forbidden
                | Self::GeoBlocked
                | Self::NetworkTimeout
                | Self::RateLimited
                | Self::BotDetection
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::RateLimited => "Rate limited by YouTube",
            Self::BotDetection => "Bot detection triggered",
            Self::AgeRestricted => "Age-restricted content",
            Self::PrivateVideo => "Private video",
            Self::VideoUnavailable => "Video unavailable",
            Self::GeoBlocked => "Geographic restriction",
            Self::DrmProtected => "DRM-protected content",
            Self::MembersOnly => "Members-only content",
            Self::NetworkTimeout => "Network unreachable or timed out",
            Self::Unknown => "Unknown lookup failure",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Http403Forbidden => {
                "YouTube returned 403 Forbidden. Try:\n\
                 1) Use a proxy (--proxy)\n\
                 2) Pass fresh cookies (--cookies or --cookies-from-browser)\n\
                 3) Update yt-dlp"
            }
            Self::RateLimited => {
                "YouTube is rate-limiting requests. Try:\n\
                 1) Wait 10-15 minutes\n\
                 2) Use a different IP (proxy/VPN)"
            }
            Self::BotDetection => {
                "YouTube detected automated access. Try:\n\
                 1) Pass cookies from a logged-in browser\n\
                 2) Use a fresh proxy"
            }
            Self::AgeRestricted => {
                "Video is age-restricted. Pass cookies from a logged-in 18+ account."
            }
            Self::PrivateVideo => {
                "Video is private. You need cookies from an account the uploader granted access to."
            }
            Self::VideoUnavailable => {
                "Video is unavailable. It may have been deleted, removed for copyright, or made private."
            }
            Self::GeoBlocked => {
                "Video is not available in your country. Use a proxy in an allowed region."
            }
            Self::DrmProtected => {
                "This content is DRM-protected and cannot be downloaded as a file."
            }
            Self::MembersOnly => {
                "This video requires a channel membership. Pass cookies from a member account."
            }
            Self::NetworkTimeout => {
                "Network timeout. Try:\n\
                 1) Check your internet connection\n\
                 2) Use a proxy\n\
                 3) Raise --lookup-timeout"
            }
            Self::Unknown => {
                "Check the URL and try again. Updating yt-dlp often helps."
            }
        }
    }

    /// Flags worth retrying with. Empty when retrying cannot succeed.
    pub fn retry_hints(&self) -> Vec<&'static str> {
        if self.is_permanent() {
            return Vec::new();
        }
        let mut hints = Vec::new();
        if self.cookies_might_help() {
            hints.push("--cookies-from-browser <BROWSER>");
        }
        if self.proxy_might_help() {
            hints.push("--proxy <URL>");
        }
        hints
    }
}

/// Map error text to a blocking reason. Returns None for empty input.
pub fn diagnose_error(error: &str) -> Option<BlockingReason> {
    let lower = error.to_lowercase();

    if lower.contains("drm")
        || lower.contains("widevine")
        || lower.contains("youtube premium")
        || lower.contains("requires purchase")
        || lower.contains("rental")
    {
        return Some(BlockingReason::DrmProtected);
    }

    if lower.contains("members only")
        || lower.contains("members-only")
        || lower.contains("join this channel")
        || lower.contains("available to members")
    {
        return Some(BlockingReason::MembersOnly);
    }

    if lower.contains("age-restricted") || lower.contains("confirm your age") {
        return Some(BlockingReason::AgeRestricted);
    }

    if lower.contains("private video") || lower.contains("video is private") {
        return Some(BlockingReason::PrivateVideo);
    }

    if lower.contains("video unavailable")
        || lower.contains("video has been removed")
        || lower.contains("no longer available")
    {
        return Some(BlockingReason::VideoUnavailable);
    }

    if lower.contains("not available in your country") || lower.contains("blocked in your country")
    {
        return Some(BlockingReason::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(BlockingReason::RateLimited);
    }

    if lower.contains("not a bot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
    {
        return Some(BlockingReason::BotDetection);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(BlockingReason::Http403Forbidden);
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("network is unreachable")
        || lower.contains("name resolution")
        || lower.contains("failed to resolve")
    {
        return Some(BlockingReason::NetworkTimeout);
    }

    if error.trim().is_empty() {
        return None;
    }

    Some(BlockingReason::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_403_detection() {
        let error = "ERROR: unable to download video data: HTTP Error 403: Forbidden";
        assert_eq!(diagnose_error(error), Some(BlockingReason::Http403Forbidden));
    }

    #[test]
    fn test_bot_detection() {
        let error = "Sign in to confirm you're not a bot";
        assert_eq!(diagnose_error(error), Some(BlockingReason::BotDetection));
    }

    #[test]
    fn test_unreachable_is_network() {
        let error = "ERROR: Unable to download webpage: <urlopen error [Errno -3] Temporary failure in name resolution>";
        assert_eq!(diagnose_error(error), Some(BlockingReason::NetworkTimeout));
        assert!(BlockingReason::NetworkTimeout.proxy_might_help());
    }

    #[test]
    fn test_age_restricted_detection() {
        let error = "Sign in to confirm your age. This video may be inappropriate for some users.";
        assert_eq!(diagnose_error(error), Some(BlockingReason::AgeRestricted));
        assert!(BlockingReason::AgeRestricted.cookies_might_help());
    }

    #[test]
    fn test_premium_is_drm() {
        let error = "This video requires YouTube Premium";
        assert_eq!(diagnose_error(error), Some(BlockingReason::DrmProtected));
        assert!(BlockingReason::DrmProtected.is_permanent());
    }

    #[test]
    fn test_retry_hints() {
        assert_eq!(
            BlockingReason::Http403Forbidden.retry_hints(),
            vec!["--cookies-from-browser <BROWSER>", "--proxy <URL>"]
        );
        assert_eq!(BlockingReason::GeoBlocked.retry_hints(), vec!["--proxy <URL>"]);
        assert!(BlockingReason::VideoUnavailable.retry_hints().is_empty());
        assert!(BlockingReason::DrmProtected.retry_hints().is_empty());
    }

    #[test]
    fn test_unrecognized_and_empty() {
        assert_eq!(diagnose_error("something odd"), Some(BlockingReason::Unknown));
        assert_eq!(diagnose_error("   "), None);
    }
}
