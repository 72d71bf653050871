use std::sync::Arc;

use error_stack::Report;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::model::{
    Bar, BillboardEntry, CompanyProfile, Dividend, FundFlowDay, MarginDay, NorthboundFlowDay,
    NorthboundHolding, Resolution, Security, SnapshotEntry, Statement, StatementPeriod,
};
use crate::source::{DataSource, DateRange};

/// Ordered list of sources tried one after another.
///
/// Each call walks the list once and returns the first non-empty result.
/// Failures and empty answers fall through to the next source; when every
/// source is exhausted the call fails with [`SourceError::Unavailable`].
pub struct SourceChain {
    sources: Vec<Arc<dyn DataSource>>,
}

impl SourceChain {
    pub fn new(sources: Vec<Arc<dyn DataSource>>) -> Self {
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    async fn first_non_empty<'a, T, F>(
        &'a self,
        what: &str,
        code: &str,
        mut call: F,
    ) -> Result<T, Report<SourceError>>
    where
        T: HasData,
        F: FnMut(&'a dyn DataSource) -> BoxFuture<'a, Result<T, Report<SourceError>>>,
    {
        for source in &self.sources {
            match call(source.as_ref()).await {
                Ok(value) if value.has_data() => {
                    debug!(source = source.name(), what, code, "source answered");
                    return Ok(value);
                }
                Ok(_) => {
                    debug!(source = source.name(), what, code, "source returned no data, trying next");
                }
                Err(e) => {
                    warn!(source = source.name(), what, code, error = ?e, "source failed, trying next");
                }
            }
        }

        Err(Report::new(SourceError::Unavailable {
            what: what.to_owned(),
            code: code.to_owned(),
        })
        .attach(format!("sources tried: {}", self.sources.len())))
    }
}

/// Results the chain can judge as empty.
pub trait HasData {
    fn has_data(&self) -> bool;
}

impl<T> HasData for Vec<T> {
    fn has_data(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> HasData for Option<T> {
    fn has_data(&self) -> bool {
        self.is_some()
    }
}

impl DataSource for SourceChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn fetch_daily(
        &self,
        security: &Security,
        range: DateRange,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            self.first_non_empty("daily bars", &security.code, |s| {
                s.fetch_daily(&security, range)
            })
            .await
        })
    }

    fn fetch_minute(
        &self,
        security: &Security,
        resolution: Resolution,
        range: DateRange,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            let what = format!("{resolution} bars");
            self.first_non_empty(&what, &security.code, |s| {
                s.fetch_minute(&security, resolution, range)
            })
            .await
        })
    }

    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<Vec<SnapshotEntry>, Report<SourceError>>> {
        Box::pin(async move {
            self.first_non_empty("equity snapshot", "*", |s| s.fetch_snapshot())
                .await
        })
    }

    fn fetch_fund_flow(
        &self,
        security: &Security,
    ) -> BoxFuture<'_, Result<Vec<FundFlowDay>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            self.first_non_empty("capital flow", &security.code, |s| {
                s.fetch_fund_flow(&security)
            })
            .await
        })
    }

    fn fetch_profile(
        &self,
        security: &Security,
    ) -> BoxFuture<'_, Result<Option<CompanyProfile>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            self.first_non_empty("company profile", &security.code, |s| {
                s.fetch_profile(&security)
            })
            .await
        })
    }

    fn fetch_statement(
        &self,
        security: &Security,
        statement: Statement,
        periods: usize,
    ) -> BoxFuture<'_, Result<Vec<StatementPeriod>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            let what = statement.title().to_lowercase();
            self.first_non_empty(&what, &security.code, |s| {
                s.fetch_statement(&security, statement, periods)
            })
            .await
        })
    }

    fn fetch_dividends(
        &self,
        security: &Security,
    ) -> BoxFuture<'_, Result<Vec<Dividend>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            self.first_non_empty("dividends", &security.code, |s| {
                s.fetch_dividends(&security)
            })
            .await
        })
    }

    fn fetch_northbound_flow(
        &self,
        days: usize,
    ) -> BoxFuture<'_, Result<Vec<NorthboundFlowDay>, Report<SourceError>>> {
        Box::pin(async move {
            self.first_non_empty("northbound flow", "*", |s| s.fetch_northbound_flow(days))
                .await
        })
    }

    fn fetch_northbound_holdings(
        &self,
        security: &Security,
        days: usize,
    ) -> BoxFuture<'_, Result<Vec<NorthboundHolding>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            self.first_non_empty("northbound holdings", &security.code, |s| {
                s.fetch_northbound_holdings(&security, days)
            })
            .await
        })
    }

    fn fetch_margin(
        &self,
        security: &Security,
        days: usize,
    ) -> BoxFuture<'_, Result<Vec<MarginDay>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            self.first_non_empty("margin trading", &security.code, |s| {
                s.fetch_margin(&security, days)
            })
            .await
        })
    }

    fn fetch_billboard(
        &self,
        security: &Security,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<BillboardEntry>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            self.first_non_empty("dragon-tiger list", &security.code, |s| {
                s.fetch_billboard(&security, limit)
            })
            .await
        })
    }

    fn fetch_index_constituents(
        &self,
        index: &Security,
    ) -> BoxFuture<'_, Result<Vec<String>, Report<SourceError>>> {
        let index = index.clone();
        Box::pin(async move {
            self.first_non_empty("index constituents", &index.code, |s| {
                s.fetch_index_constituents(&index)
            })
            .await
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;

    /// Scripted source: fails, answers empty, or answers with fixed bars.
    pub(crate) enum Behaviour {
        Fail,
        Empty,
        Bars(Vec<Bar>),
    }

    pub(crate) struct ScriptedSource {
        pub name: &'static str,
        pub behaviour: Behaviour,
        pub calls: AtomicUsize,
    }

    impl ScriptedSource {
        pub(crate) fn new(name: &'static str, behaviour: Behaviour) -> Self {
            Self {
                name,
                behaviour,
                calls: AtomicUsize::new(0),
            }
        }

        fn answer(&self) -> Result<Vec<Bar>, Report<SourceError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Fail => Err(Report::new(SourceError::Request {
                    source_name: self.name.into(),
                })),
                Behaviour::Empty => Ok(vec![]),
                Behaviour::Bars(bars) => Ok(bars.clone()),
            }
        }
    }

    impl DataSource for ScriptedSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn fetch_daily(
            &self,
            _security: &Security,
            _range: DateRange,
        ) -> BoxFuture<'_, Result<Vec<Bar>, Report<SourceError>>> {
            Box::pin(async move { self.answer() })
        }

        fn fetch_minute(
            &self,
            _security: &Security,
            _resolution: Resolution,
            _range: DateRange,
        ) -> BoxFuture<'_, Result<Vec<Bar>, Report<SourceError>>> {
            Box::pin(async move { self.answer() })
        }

        fn fetch_snapshot(
            &self,
        ) -> BoxFuture<'_, Result<Vec<SnapshotEntry>, Report<SourceError>>> {
            Box::pin(async move {
                self.answer().map(|bars| {
                    bars.iter()
                        .map(|_| SnapshotEntry {
                            code: "600000".into(),
                            name: self.name.into(),
                        })
                        .collect()
                })
            })
        }

        fn fetch_fund_flow(
            &self,
            _security: &Security,
        ) -> BoxFuture<'_, Result<Vec<FundFlowDay>, Report<SourceError>>> {
            Box::pin(async move { self.answer().map(|_| vec![]) })
        }

        fn fetch_profile(
            &self,
            _security: &Security,
        ) -> BoxFuture<'_, Result<Option<CompanyProfile>, Report<SourceError>>> {
            Box::pin(async move { self.answer().map(|_| None) })
        }
    }

    pub(crate) fn one_bar(close: f64) -> Vec<Bar> {
        vec![Bar {
            timestamp: NaiveDateTime::parse_from_str("2024-01-02 15:00", "%Y-%m-%d %H:%M")
                .unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
            amount: 1000.0,
            turnover_rate: Some(1.0),
        }]
    }

    fn range() -> DateRange {
        DateRange::lookback(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(), 90)
    }

    fn security() -> Security {
        Security::from_normalized("600000").unwrap()
    }

    #[tokio::test]
    async fn first_non_empty_source_wins() {
        let failing = Arc::new(ScriptedSource::new("failing", Behaviour::Fail));
        let empty = Arc::new(ScriptedSource::new("empty", Behaviour::Empty));
        let good = Arc::new(ScriptedSource::new("good", Behaviour::Bars(one_bar(10.0))));
        let never = Arc::new(ScriptedSource::new("never", Behaviour::Bars(one_bar(99.0))));

        let chain = SourceChain::new(vec![
            failing.clone(),
            empty.clone(),
            good.clone(),
            never.clone(),
        ]);
        let bars = chain.fetch_daily(&security(), range()).await.unwrap();

        assert_eq!(bars[0].close, 10.0);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(empty.calls.load(Ordering::SeqCst), 1);
        assert_eq!(good.calls.load(Ordering::SeqCst), 1);
        assert_eq!(never.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_unavailable() {
        let chain = SourceChain::new(vec![
            Arc::new(ScriptedSource::new("failing", Behaviour::Fail)),
            Arc::new(ScriptedSource::new("empty", Behaviour::Empty)),
        ]);
        let err = chain
            .fetch_minute(&security(), Resolution::Min5, range())
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            SourceError::Unavailable { .. }
        ));
    }

    #[tokio::test]
    async fn empty_chain_reports_unavailable() {
        let chain = SourceChain::new(vec![]);
        assert!(chain.is_empty());
        assert!(chain.fetch_snapshot().await.is_err());
    }

    #[tokio::test]
    async fn unserved_data_kinds_are_unsupported_then_unavailable() {
        let scripted = ScriptedSource::new("bars-only", Behaviour::Bars(one_bar(1.0)));
        let err = scripted.fetch_dividends(&security()).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            SourceError::Unsupported { operation, .. } if operation == "dividends"
        ));

        let chain = SourceChain::new(vec![Arc::new(scripted)]);
        let err = chain.fetch_margin(&security(), 10).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            SourceError::Unavailable { what, .. } if what == "margin trading"
        ));
    }

    #[tokio::test]
    async fn profile_none_falls_through() {
        let chain = SourceChain::new(vec![Arc::new(ScriptedSource::new(
            "good",
            Behaviour::Bars(one_bar(1.0)),
        ))]);
        // The scripted source always answers `None` for profiles.
        assert!(chain.fetch_profile(&security()).await.is_err());
    }
}
