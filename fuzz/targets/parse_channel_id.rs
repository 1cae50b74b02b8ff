#![no_main]

use bayeux_router::ChannelId;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|path: &str| {
    // Разбор не должен паниковать ни на какой строке.
    let Ok(id) = ChannelId::parse(path) else {
        return;
    };

    assert_eq!(id.as_str(), path);
    assert_eq!(ChannelId::parse(id.as_str()).as_ref(), Ok(&id));

    if let Some(parent) = id.parent() {
        assert!(parent.is_parent_of(&id));
        assert_eq!(parent.depth() + 1, id.depth());
    }
    if !id.is_root() && !id.is_wildcard() {
        assert!(id.matches(&id));
    }
});
