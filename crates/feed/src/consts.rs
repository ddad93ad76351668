use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Every link in the root listing names one package.
selector!(ANCHOR_SELECTOR, "a");
// XML-RPC responses go through the HTML parser, which lowercases tag names.
selector!(VALUE_SELECTOR, "value");
selector!(FAULT_SELECTOR, "fault");
regex!(RENAME_REGEX, r"^rename from\s+(\S.*)$");
