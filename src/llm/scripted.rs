use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GenerationError;
use crate::llm::client::{GenerationOptions, TextGenerator};

type Scripted = Result<String, GenerationError>;

struct Rule {
    needles: Vec<String>,
    queue: VecDeque<Scripted>,
}

/// Deterministic generator that replays canned responses.
///
/// Rules are matched in insertion order against the concatenated system and
/// user prompt; a rule matches when every one of its needles occurs. Each
/// rule holds a queue whose last entry repeats forever. Unmatched calls draw
/// from the fallback queue. Used for offline runs and tests.
pub struct ScriptedGenerator {
    rules: Mutex<Vec<Rule>>,
    fallback: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<String>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            fallback: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer prompts containing `needle` with `response`.
    pub fn on(self, needle: &str, response: &str) -> Self {
        self.push_rule(&[needle], Ok(response.to_string()));
        self
    }

    /// Answer prompts containing all of `needles` with `response`.
    pub fn on_all(self, needles: &[&str], response: &str) -> Self {
        self.push_rule(needles, Ok(response.to_string()));
        self
    }

    /// Fail prompts containing `needle` with `error`.
    pub fn fail_on(self, needle: &str, error: GenerationError) -> Self {
        self.push_rule(&[needle], Err(error));
        self
    }

    /// Queue a response for prompts no rule matches.
    pub fn then(self, response: &str) -> Self {
        if let Ok(mut queue) = self.fallback.lock() {
            queue.push_back(Ok(response.to_string()));
        }
        self
    }

    pub fn then_fail(self, error: GenerationError) -> Self {
        if let Ok(mut queue) = self.fallback.lock() {
            queue.push_back(Err(error));
        }
        self
    }

    fn push_rule(&self, needles: &[&str], entry: Scripted) {
        let Ok(mut rules) = self.rules.lock() else {
            return;
        };
        let needles: Vec<String> = needles.iter().map(|n| n.to_string()).collect();
        match rules.iter_mut().find(|r| r.needles == needles) {
            Some(rule) => rule.queue.push_back(entry),
            None => rules.push(Rule {
                needles,
                queue: VecDeque::from([entry]),
            }),
        }
    }

    /// User prompts seen so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

fn pop_sticky(queue: &mut VecDeque<Scripted>) -> Option<Scripted> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

fn poisoned<T>(_: T) -> GenerationError {
    GenerationError::Unavailable("scripted generator lock poisoned".into())
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _options: GenerationOptions,
    ) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .map_err(poisoned)?
            .push(user_prompt.to_string());

        let haystack = format!("{}\n{}", system_prompt, user_prompt);
        {
            let mut rules = self.rules.lock().map_err(poisoned)?;
            let matched = rules
                .iter_mut()
                .find(|r| r.needles.iter().all(|n| haystack.contains(n.as_str())));
            if let Some(entry) = matched.and_then(|r| pop_sticky(&mut r.queue)) {
                return entry;
            }
        }

        let mut fallback = self.fallback.lock().map_err(poisoned)?;
        pop_sticky(&mut fallback)
            .unwrap_or_else(|| Err(GenerationError::Unavailable("no scripted response".into())))
    }
}
