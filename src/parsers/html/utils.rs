/// ASCII 空白字符
pub const WHITESPACES: &[char] = &[' ', '\t', '\n', '\x0c', '\r'];

/// 块级元素
pub const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "dialog", "dd", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hgroup", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary",
    "table", "tbody", "thead", "tfoot", "tr", "td", "th", "ul",
];

/// 检查标签是否为块级元素
pub fn is_block_element(tag: &str) -> bool {
    BLOCK_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

/// 去除首尾空白并把连续空白折叠为单个空格
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 按字符（Unicode 标量值）下标截取 `[start, end)`，越界返回 `None`
pub fn char_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let start_byte = char_to_byte(text, start)?;
    let end_byte = char_to_byte(text, end)?;
    text.get(start_byte..end_byte)
}

/// 字符下标转字节下标，允许指向末尾
pub fn char_to_byte(text: &str, char_index: usize) -> Option<usize> {
    if char_index == 0 {
        return Some(0);
    }
    let mut count = 0;
    for (byte_index, _) in text.char_indices() {
        if count == char_index {
            return Some(byte_index);
        }
        count += 1;
    }
    (count == char_index).then_some(text.len())
}

/// 字符级 `find`，返回字符下标
pub fn char_find(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .find(needle)
        .map(|byte_index| haystack[..byte_index].chars().count())
}
