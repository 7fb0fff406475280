//! Cache key builders. One function per keyspace prefix so callers cannot
//! drift from the invalidation patterns.

pub const GENERAL_STATS: &str = "general_stats";
pub const BRANCHES_LIST: &str = "branches_list";

pub fn reviews_page(branch_id: &str, limit: i64, offset: i64) -> String {
    format!("reviews:{branch_id}:{limit}:{offset}")
}

pub fn branch_stats(branch_id: &str) -> String {
    format!("branch_stats:{branch_id}")
}

pub fn recent_reviews(days: i32) -> String {
    format!("recent_reviews:{days}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match_invalidation_patterns() {
        assert_eq!(reviews_page("70001", 50, 100), "reviews:70001:50:100");
        assert_eq!(branch_stats("70001"), "branch_stats:70001");
        assert_eq!(recent_reviews(7), "recent_reviews:7");
    }
}
