use memebot_config::Config;
use memebot_llm::{KeepAlive, OllamaQueueOptions};

/// Build queue options from application config.
pub fn queue_options_from_config(cfg: &Config) -> OllamaQueueOptions {
    OllamaQueueOptions {
        model: cfg.ollama.model.clone(),
        api_url: cfg.ollama.api_url.clone(),
        ordering: cfg.dispatch.ordering,
        request_timeout: cfg.ollama.request_timeout(),
        keep_alive: cfg.ollama.keep_alive.as_deref().map(KeepAlive::from),
    }
}

/// One prompt read from a batch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    /// 1-based line number in the source file
    pub line: usize,
    pub priority: i64,
    pub prompt: String,
}

/// Split a batch file into prompts, skipping blank lines.
///
/// With `priority_prefix`, a line such as `5: roast my code` runs at priority
/// 5. Lines whose text before the first `:` is not an integer keep priority 0
/// and are sent whole.
pub fn parse_batch(contents: &str, priority_prefix: bool) -> Vec<BatchItem> {
    contents
        .lines()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let text = raw.trim();
            if text.is_empty() {
                return None;
            }
            let (priority, prompt) = if priority_prefix {
                split_priority(text)
            } else {
                (0, text)
            };
            Some(BatchItem {
                line: idx + 1,
                priority,
                prompt: prompt.to_string(),
            })
        })
        .collect()
}

fn split_priority(text: &str) -> (i64, &str) {
    match text.split_once(':') {
        Some((head, rest)) if !rest.trim().is_empty() => match head.trim().parse::<i64>() {
            Ok(priority) => (priority, rest.trim()),
            Err(_) => (0, text),
        },
        _ => (0, text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memebot_dispatch::OrderingMode;

    #[test]
    fn options_follow_config() {
        let mut cfg = Config::default();
        cfg.ollama.model = "mistral".into();
        cfg.ollama.keep_alive = Some("-1".into());
        cfg.ollama.request_timeout_secs = 30;
        cfg.dispatch.ordering = OrderingMode::Fifo;

        let options = queue_options_from_config(&cfg);
        assert_eq!(options.model, "mistral");
        assert_eq!(options.api_url, "http://localhost:11434");
        assert_eq!(options.ordering, OrderingMode::Fifo);
        assert_eq!(options.request_timeout.as_secs(), 30);
        assert_eq!(options.keep_alive, Some(KeepAlive::Seconds(-1)));
    }

    #[test]
    fn batch_skips_blank_lines_and_keeps_line_numbers() {
        let items = parse_batch("first\n\n   \nsecond  \n", false);
        assert_eq!(
            items,
            vec![
                BatchItem {
                    line: 1,
                    priority: 0,
                    prompt: "first".into()
                },
                BatchItem {
                    line: 4,
                    priority: 0,
                    prompt: "second".into()
                },
            ]
        );
    }

    #[test]
    fn batch_priority_prefix() {
        let items = parse_batch(
            "5: urgent meme\n-2:later\nnote: not a number\n7:\nplain\n",
            true,
        );
        let got: Vec<(i64, &str)> = items
            .iter()
            .map(|i| (i.priority, i.prompt.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (5, "urgent meme"),
                (-2, "later"),
                (0, "note: not a number"),
                (0, "7:"),
                (0, "plain"),
            ]
        );
    }

    #[test]
    fn batch_without_prefix_flag_keeps_colons() {
        let items = parse_batch("5: urgent meme", false);
        assert_eq!(items[0].priority, 0);
        assert_eq!(items[0].prompt, "5: urgent meme");
    }
}
