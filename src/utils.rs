/// Splits text into per-line word lists, preserving line structure.
/// Empty lines come back as zero-word lines.
pub fn split_into_words_w_newline(text: &str) -> Vec<Vec<&str>> {
    if text.is_empty() {
        return Vec::new();
    }
    text.lines()
        .map(|line| line.split_whitespace().collect())
        .collect()
}

/// Keeps only the last `n` words of `text` while preserving line breaks.
///
/// Returns the trimmed original when it holds `n` words or fewer, and an
/// empty string when `n` is zero or the text is empty.
pub fn keep_last_n_words(text: &str, n: usize) -> String {
    if text.is_empty() || n == 0 {
        return String::new();
    }
    let split_text = split_into_words_w_newline(text);
    let total: usize = split_text.iter().map(|line| line.len()).sum();
    if total <= n {
        return text.trim().to_string();
    }

    let mut words_found = 0;
    let mut result_lines: Vec<Vec<&str>> = Vec::new();
    for line in split_text.iter().rev() {
        if line.is_empty() {
            if words_found < n {
                result_lines.push(Vec::new());
            }
            continue;
        }
        if words_found + line.len() <= n {
            result_lines.push(line.clone());
            words_found += line.len();
        } else {
            let needed = n - words_found;
            if needed > 0 {
                result_lines.push(line[line.len() - needed..].to_vec());
            }
            break;
        }
    }
    result_lines.reverse();

    join_word_lines(&result_lines)
}

/// Removes the last `n` words from `text`, returning the prefix that remains
/// with its line breaks intact. `n` of zero or empty text returns the text
/// unchanged.
pub fn remove_last_n_words(text: &str, n: usize) -> String {
    if text.is_empty() || n == 0 {
        return text.to_string();
    }
    let mut lines = split_into_words_w_newline(text);
    let mut remaining = n;
    while remaining > 0 {
        let last_len = match lines.last() {
            Some(line) => line.len(),
            None => break,
        };
        if last_len <= remaining {
            remaining -= last_len;
            lines.pop();
        } else {
            let keep = last_len - remaining;
            if let Some(last) = lines.last_mut() {
                last.truncate(keep);
            }
            remaining = 0;
        }
    }

    join_word_lines(&lines)
}

fn join_word_lines(lines: &[Vec<&str>]) -> String {
    lines
        .iter()
        .map(|line| line.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
