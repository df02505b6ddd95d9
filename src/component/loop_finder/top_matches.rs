use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopMatch {
    pub from: String,
    pub to: String,
    pub match_percent: f64,
}

/// 依相似度由高到低保留前 K 筆，不去除重複
#[derive(Debug, Clone)]
pub struct TopMatchesTracker {
    capacity: usize,
    entries: Vec<TopMatch>,
}

impl TopMatchesTracker {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// 相同相似度時先加入者排前面
    pub fn add(&mut self, from: &str, to: &str, match_percent: f64) {
        let position = self
            .entries
            .partition_point(|e| e.match_percent.total_cmp(&match_percent).is_ge());

        if position >= self.capacity {
            return;
        }

        self.entries.insert(
            position,
            TopMatch {
                from: from.to_string(),
                to: to.to_string(),
                match_percent,
            },
        );
        self.entries.truncate(self.capacity);
    }

    /// 目前排名的快照
    #[must_use]
    pub fn top(&self) -> Vec<TopMatch> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
