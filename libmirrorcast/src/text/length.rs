//! Effective post length as counted by the destination platform
//!
//! Platforms count every link as a fixed-width shortened URL no matter how long
//! it really is. Splitting decisions are only correct if we count the same
//! way, so URL detection here follows the same rules the platform uses: a host
//! must end in a known top-level domain, bare IPv4 hosts only count when they
//! carry a path, and domains glued to an `@` are handles or e-mail addresses.

use lazy_static::lazy_static;
use regex::Regex;

/// Top-level domains recognised as the end of a host name
const TLDS: &[&str] = &[
    // generic
    "com", "net", "org", "edu", "gov", "mil", "int", "info", "biz", "name", "pro", "aero",
    "coop", "museum", "mobi", "asia", "tel", "travel", "jobs", "cat", "xxx", "post", "app",
    "dev", "blog", "shop", "online", "site", "tech", "store", "xyz", "club", "social", "art",
    "news", "page", "cloud", "space", "website", "life", "live", "world", "today", "email",
    "digital", "network", "agency", "media", "studio", "design", "company", "zone", "ninja",
    "rocks", "guru", "link", "click", "top", "wiki", "one", "city", "global", "center",
    "systems", "solutions", "services", "photography", "photo", "photos", "games", "game",
    "music", "video", "blue", "red", "pink", "green", "black", "land", "town", "party", "moe",
    "lol", "gay", "science", "software", "foundation", "community", "institute", "academy",
    "events", "works", "tools", "codes", "chat", "run", "host", "fun", "ink", "icu", "work",
    "win", "bio", "eco", "fyi", "wtf", "coffee", "cafe", "pub", "law", "health", "church",
    "london", "berlin", "paris", "nyc", "tokyo", "amsterdam", "wales", "scot", "eus", "bzh",
    "onion",
    // country codes
    "ac", "ad", "ae", "af", "ag", "ai", "al", "am", "ao", "aq", "ar", "as", "at", "au", "aw",
    "ax", "az", "ba", "bb", "bd", "be", "bf", "bg", "bh", "bi", "bj", "bm", "bn", "bo", "br",
    "bs", "bt", "bw", "by", "bz", "ca", "cc", "cd", "cf", "cg", "ch", "ci", "ck", "cl", "cm",
    "cn", "co", "cr", "cu", "cv", "cw", "cx", "cy", "cz", "de", "dj", "dk", "dm", "do", "dz",
    "ec", "ee", "eg", "er", "es", "et", "eu", "fi", "fj", "fk", "fm", "fo", "fr", "ga", "gd",
    "ge", "gf", "gg", "gh", "gi", "gl", "gm", "gn", "gp", "gq", "gr", "gs", "gt", "gu", "gw",
    "gy", "hk", "hm", "hn", "hr", "ht", "hu", "id", "ie", "il", "im", "in", "io", "iq", "ir",
    "is", "it", "je", "jm", "jo", "jp", "ke", "kg", "kh", "ki", "km", "kn", "kp", "kr", "kw",
    "ky", "kz", "la", "lb", "lc", "li", "lk", "lr", "ls", "lt", "lu", "lv", "ly", "ma", "mc",
    "md", "me", "mg", "mh", "mk", "ml", "mm", "mn", "mo", "mp", "mq", "mr", "ms", "mt", "mu",
    "mv", "mw", "mx", "my", "mz", "na", "nc", "ne", "nf", "ng", "ni", "nl", "no", "np", "nr",
    "nu", "nz", "om", "pa", "pe", "pf", "pg", "ph", "pk", "pl", "pm", "pn", "pr", "ps", "pt",
    "pw", "py", "qa", "re", "ro", "rs", "ru", "rw", "sa", "sb", "sc", "sd", "se", "sg", "sh",
    "si", "sk", "sl", "sm", "sn", "so", "sr", "ss", "st", "su", "sv", "sx", "sy", "sz", "tc",
    "td", "tf", "tg", "th", "tj", "tk", "tl", "tm", "tn", "to", "tr", "tt", "tv", "tw", "tz",
    "ua", "ug", "uk", "us", "uy", "uz", "va", "vc", "ve", "vg", "vi", "vn", "vu", "wf", "ws",
    "ye", "yt", "za", "zm", "zw",
];

/// Characters allowed in the path/query part of a URL
const PATH_CHARS: &str = r"[\w\-.~:/?#\[\]@!$&'()*+,;=%]";

lazy_static! {
    static ref URL_REGEX: Regex = {
        let tlds = TLDS.join("|");
        Regex::new(&format!(
            r"(?i)(?:https?://)?(?:(?:[\w-]+\.)+(?:{tlds})\b(?::\d{{1,5}})?(?:[/?#]{path}*)?|(?:\d{{1,3}}\.){{3}}\d{{1,3}}(?::\d{{1,5}})?/{path}*)",
            tlds = tlds,
            path = PATH_CHARS,
        ))
        .expect("URL pattern is valid")
    };
}

/// Punctuation that ends a sentence rather than a URL
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', '\''];

/// Find every URL-like substring, in order of appearance
pub fn find_urls(text: &str) -> Vec<&str> {
    URL_REGEX
        .find_iter(text)
        .filter(|m| {
            let before = text[..m.start()].chars().next_back();
            let after = text[m.end()..].chars().next();
            before != Some('@') && after != Some('@')
        })
        .map(|m| m.as_str().trim_end_matches(TRAILING_PUNCTUATION))
        .filter(|url| !url.is_empty())
        .collect()
}

/// True if `text` contains at least one URL
pub fn contains_url(text: &str) -> bool {
    !find_urls(text).is_empty()
}

/// Length of `text` as the platform will count it
///
/// Every URL counts as exactly `short_url_length` characters.
pub fn estimate(text: &str, short_url_length: usize) -> usize {
    let urls = find_urls(text);
    let raw = text.chars().count();
    let replaced: usize = urls.iter().map(|url| url.chars().count()).sum();
    raw - replaced + short_url_length * urls.len()
}
