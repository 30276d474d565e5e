//! Built-in registries.

use crate::registry::{ChannelRegistry, ChannelRules};

/// Names accepted by [`by_name`].
pub const PRESET_NAMES: [&str; 2] = ["shell", "empty"];

/// Look up a built-in registry.
pub fn by_name(name: &str) -> Option<ChannelRegistry> {
    match name {
        "shell" => Some(shell()),
        "empty" => Some(ChannelRegistry::new()),
        _ => None,
    }
}

/// Tables for the desktop shell's sandboxed windows.
pub fn shell() -> ChannelRegistry {
    ChannelRegistry {
        invoke: ChannelRules::new(
            [
                "show-error-box",
                "show-message-box",
                "open-external",
                "get-platform",
                "openOBS",
                "open-external-link",
                "openTexthooker",
                "runOverlay",
                "run-furigana-window",
                "get_gsm_status",
                "ocr-replacements.load",
                "ocr-replacements.save",
            ],
            [
                "state.",
                "settings.",
                "python.",
                "logs.",
                "ocr.",
                "obs.",
                "steam.",
                "vn.",
                "yuzu.",
                "front.",
                "wanakana-",
                "kuroshiro-",
            ],
        ),
        send: ChannelRules::new(
            [
                "tab-changed",
                "terminal-data",
                "hide",
                "show",
                "release-mouse",
                "open-settings",
                "open-yomitan-settings",
                "reply-current-settings",
                "close-furigana-window",
                "app-close",
                "app-minimize",
            ],
            [
                "ocr.",
                "settings.",
                "websocket-",
                "yomitan-",
                "toggle-",
                "update-",
                "set-",
                "resize-",
                "open-",
                "setting-",
                "text-",
            ],
        ),
        on: ChannelRules::new(
            [
                "installing",
                "steamGamesUpdated",
                "state-cleared",
                "notification",
                "load-settings",
                "display-info",
                "afk-hide",
                "show-overlay-hotkey",
                "toggle-furigana-visibility",
                "force-visible",
                "toggle-main-box",
                "new-magpieCompatibility",
                "furigana-script-result",
                "set-furigana-character",
                "preload-settings",
            ],
            ["terminal-", "ocr-", "state-", "websocket-", "settings-", "gsm-"],
        ),
    }
}
