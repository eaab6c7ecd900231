use crate::api::Time;

/// Human-readable age of something created at `then`, as seen at `now`
pub fn time_ago(then: Time, now: Time) -> String {
    let secs = (now - then).num_seconds();
    let plural = |n: i64, unit: &str| match n {
        1 => format!("1 {unit} ago"),
        n => format!("{n} {unit}s ago"),
    };
    match secs {
        s if s < 60 => String::from("just now"),
        s if s < 3600 => plural(s / 60, "minute"),
        s if s < 86400 => plural(s / 3600, "hour"),
        s => plural(s / 86400, "day"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comment::tests::at;

    #[test]
    fn ages() {
        let now = at(1_000_000);
        assert_eq!(time_ago(at(1_000_000 - 59), now), "just now");
        // clock skew puts things in the future
        assert_eq!(time_ago(at(1_000_100), now), "just now");
        assert_eq!(time_ago(at(1_000_000 - 60), now), "1 minute ago");
        assert_eq!(time_ago(at(1_000_000 - 3599), now), "59 minutes ago");
        assert_eq!(time_ago(at(1_000_000 - 7200), now), "2 hours ago");
        assert_eq!(time_ago(at(1_000_000 - 86400 * 3), now), "3 days ago");
    }
}
