#![no_main]

use libfuzzer_sys::fuzz_target;
use projdesk_core::auth::{Scope, resolve_scope};
use projdesk_core::config::Config;

// Input is config JSON, a NUL byte, then `channel\nactor`.
fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let (config, rest) = raw.split_once('\0').unwrap_or((&*raw, ""));
    let Ok(config) = serde_json::from_str::<Config>(config) else {
        return;
    };
    let (channel, actor) = rest.split_once('\n').unwrap_or((rest, ""));

    let scope = resolve_scope(&config, channel, actor);
    assert_eq!(scope, resolve_scope(&config, channel, actor));
    if matches!(scope, Scope::ExternalScoped { .. }) {
        assert!(config.is_external_authorized(actor));
    }
});
