//! 速率限制 - 令牌桶与日配额
//!
//! 供 LLM / 图像适配器共用:
//! - RateLimiter: 令牌桶限流，acquire 在拿到令牌前挂起（不失败）
//! - DailyQuota: 按日请求配额，UTC 午夜重置，耗尽后立即拒绝

use chrono::{DateTime, NaiveTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// 令牌桶限流器
///
/// period 为单个令牌的生成间隔，burst 为桶容量（突发上限）
pub struct RateLimiter {
    period: Duration,
    burst: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(period: Duration, burst: u32) -> Self {
        Self {
            period,
            burst: f64::from(burst.max(1)),
            state: Mutex::new(BucketState {
                tokens: f64::from(burst.max(1)),
                last_refill: Instant::now(),
            }),
        }
    }

    /// 每分钟 requests 次的便捷构造
    pub fn per_minute(requests: u32, burst: u32) -> Self {
        Self::new(Duration::from_secs(60) / requests.max(1), burst)
    }

    /// 取一个令牌，桶空时挂起等待补充
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.last_refill.elapsed();
                state.tokens = (state.tokens
                    + elapsed.as_secs_f64() / self.period.as_secs_f64())
                .min(self.burst);
                state.last_refill = Instant::now();

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) * self.period.as_secs_f64())
            };
            tokio::time::sleep(wait).await;
        }
    }
}

/// 日配额错误
#[derive(Debug, Error, PartialEq, Eq)]
#[error("daily quota exceeded ({used}/{max})")]
pub struct QuotaExceeded {
    pub used: u32,
    pub max: u32,
}

/// 滚动日配额，UTC 午夜重置
///
/// max 为 0 表示不限制; 与每分钟限流相互独立
pub struct DailyQuota {
    max: u32,
    state: std::sync::Mutex<QuotaState>,
}

struct QuotaState {
    used: u32,
    reset_at: DateTime<Utc>,
}

impl DailyQuota {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            state: std::sync::Mutex::new(QuotaState {
                used: 0,
                reset_at: next_midnight_utc(Utc::now()),
            }),
        }
    }

    /// 占用一次配额; 耗尽时立即失败（不等待）
    pub fn try_acquire(&self) -> Result<(), QuotaExceeded> {
        if self.max == 0 {
            return Ok(());
        }

        let mut state = match self.state.lock() {
            Ok(state) => state,
            // 锁中毒只会发生在持锁代码 panic 后; 继续使用内部状态
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = Utc::now();
        if now >= state.reset_at {
            state.used = 0;
            state.reset_at = next_midnight_utc(now);
        }

        if state.used >= self.max {
            return Err(QuotaExceeded {
                used: state.used,
                max: self.max,
            });
        }

        state.used += 1;
        Ok(())
    }

    #[cfg(test)]
    fn force_reset_at(&self, reset_at: DateTime<Utc>) {
        if let Ok(mut state) = self.state.lock() {
            state.reset_at = reset_at;
        }
    }
}

/// 下一个 UTC 午夜
fn next_midnight_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + chrono::Days::new(1);
    tomorrow.and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_acquires_immediately() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 3);

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_bucket_waits_for_refill() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 1);
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        // 暂停时钟下 sleep 自动推进，等待时长应约等于一个令牌周期
        assert!(start.elapsed() >= Duration::from_secs(9));
    }

    #[test]
    fn test_daily_quota_exhaustion() {
        let quota = DailyQuota::new(2);
        assert!(quota.try_acquire().is_ok());
        assert!(quota.try_acquire().is_ok());

        let err = quota.try_acquire().unwrap_err();
        assert_eq!(err, QuotaExceeded { used: 2, max: 2 });
    }

    #[test]
    fn test_daily_quota_unlimited_when_zero() {
        let quota = DailyQuota::new(0);
        for _ in 0..1000 {
            assert!(quota.try_acquire().is_ok());
        }
    }

    #[test]
    fn test_daily_quota_resets_after_midnight() {
        let quota = DailyQuota::new(1);
        assert!(quota.try_acquire().is_ok());
        assert!(quota.try_acquire().is_err());

        // 把重置时刻拨到过去，模拟跨过 UTC 午夜
        quota.force_reset_at(Utc::now() - chrono::Duration::seconds(1));
        assert!(quota.try_acquire().is_ok());
    }

    #[test]
    fn test_next_midnight_is_start_of_next_day() {
        let now = Utc::now();
        let midnight = next_midnight_utc(now);
        assert!(midnight > now);
        assert_eq!(midnight.time(), NaiveTime::MIN);
    }
}
