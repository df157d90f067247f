use std::collections::VecDeque;

use crate::error::Result;
use crate::llm::PriorExchange;
use crate::snowman::SnowmanAgent;

/// Rolling window of the most recent question/answer pairs.
#[derive(Debug, Clone)]
pub struct Conversation {
    exchanges: VecDeque<PriorExchange>,
    max_runs: usize,
}

impl Conversation {
    pub fn new(max_runs: usize) -> Self {
        Self {
            exchanges: VecDeque::with_capacity(max_runs),
            max_runs,
        }
    }

    pub fn record(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        if self.max_runs == 0 {
            return;
        }
        if self.exchanges.len() == self.max_runs {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(PriorExchange {
            question: question.into(),
            answer: answer.into(),
        });
    }

    pub fn history(&self) -> Vec<PriorExchange> {
        self.exchanges.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Ask with the current window as context and remember the exchange.
    pub async fn ask(&mut self, agent: &SnowmanAgent, question: &str) -> Result<String> {
        let answer = agent.answer(question, &self.history()).await?;
        self.record(question.trim(), answer.clone());
        Ok(answer)
    }
}
