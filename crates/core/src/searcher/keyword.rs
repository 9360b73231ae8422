//! Keyword cleanup before it is sent to a site.

/// Characters most site search engines treat as operators or choke on.
const RESERVED: &[char] = &[
    '!', '"', '#', '$', '%', '&', '\'', '(', ')', '*', '+', ',', '/', ':', ';', '<', '=', '>',
    '?', '@', '[', '\\', ']', '^', '`', '{', '|', '}', '~', '-', '_', '.', '·', '！', '？', '，',
    '。', '：', '；', '、', '“', '”', '‘', '’', '（', '）', '【', '】', '《', '》', '～', '…',
    '—', '・',
];

/// Replace reserved punctuation with `replacement` and collapse whitespace.
///
/// With `allow_space` words stay separated by single spaces; without it all
/// whitespace is removed.
pub fn sanitize(text: &str, replacement: &str, allow_space: bool) -> String {
    let mut replaced = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            replaced.push_str(replacement);
        } else {
            replaced.push(c);
        }
    }

    let words = replaced.split_whitespace();
    if allow_space {
        words.collect::<Vec<_>>().join(" ")
    } else {
        words.collect()
    }
}

/// True when the text contains any CJK ideograph.
pub fn is_chinese(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c as u32,
            0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x20000..=0x2A6DF
            | 0xF900..=0xFAFF)
    })
}
