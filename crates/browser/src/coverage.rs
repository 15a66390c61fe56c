//! JS and CSS coverage collection over DevTools

use std::collections::HashMap;
use std::sync::Arc;

use chromiumoxide::cdp::browser_protocol::css::{
    self, EventStyleSheetAdded, GetStyleSheetTextParams, StartRuleUsageTrackingParams,
    StopRuleUsageTrackingParams, StyleSheetId,
};
use chromiumoxide::cdp::browser_protocol::dom;
use chromiumoxide::cdp::js_protocol::debugger::{self, GetScriptSourceParams};
use chromiumoxide::cdp::js_protocol::profiler::{
    self, ScriptCoverage, StartPreciseCoverageParams, StopPreciseCoverageParams,
    TakePreciseCoverageParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use mocharun_common::coverage::{
    disjoint_used_ranges, merge_ranges, CountedRange, CoverageEntry, CoverageRange,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::BrowserResult;

/// Records coverage between `start` (before navigation) and `stop`
pub struct CoverageRecorder {
    stylesheets: Arc<Mutex<HashMap<String, String>>>,
    watcher: JoinHandle<()>,
}

impl CoverageRecorder {
    pub async fn start(page: &Page) -> BrowserResult<Self> {
        page.execute(profiler::EnableParams::default()).await?;
        page.execute(debugger::EnableParams::default()).await?;
        page.execute(
            StartPreciseCoverageParams::builder()
                .call_count(true)
                .detailed(true)
                .build(),
        )
        .await?;

        let stylesheets: Arc<Mutex<HashMap<String, String>>> = Arc::default();
        let mut added = page.event_listener::<EventStyleSheetAdded>().await?;
        let seen = stylesheets.clone();
        let watcher = tokio::spawn(async move {
            while let Some(event) = added.next().await {
                let header = &event.header;
                seen.lock()
                    .insert(header.style_sheet_id.inner().clone(), header.source_url.clone());
            }
        });

        page.execute(dom::EnableParams::default()).await?;
        page.execute(css::EnableParams::default()).await?;
        page.execute(StartRuleUsageTrackingParams::default()).await?;

        info!("Coverage collection started");
        Ok(Self {
            stylesheets,
            watcher,
        })
    }

    /// Stop collection and return JS entries followed by CSS entries
    pub async fn stop(self, page: &Page) -> BrowserResult<Vec<CoverageEntry>> {
        let js = page.execute(TakePreciseCoverageParams::default()).await?;
        page.execute(StopPreciseCoverageParams::default()).await?;
        let css = page.execute(StopRuleUsageTrackingParams::default()).await?;
        self.watcher.abort();

        let mut entries = Vec::new();
        for script in &js.result.result {
            if let Some(entry) = script_entry(page, script).await {
                entries.push(entry);
            }
        }

        let mut usage: HashMap<String, (StyleSheetId, Vec<CoverageRange>)> = HashMap::new();
        for rule in &css.result.rule_usage {
            let slot = usage
                .entry(rule.style_sheet_id.inner().clone())
                .or_insert_with(|| (rule.style_sheet_id.clone(), Vec::new()));
            if rule.used {
                slot.1.push(CoverageRange::new(
                    rule.start_offset.max(0.0) as u64,
                    rule.end_offset.max(0.0) as u64,
                ));
            }
        }

        let urls = self.stylesheets.lock().clone();
        for (key, (id, ranges)) in usage {
            let Some(url) = urls.get(&key).filter(|u| !u.is_empty()) else {
                continue;
            };
            let text = match page.execute(GetStyleSheetTextParams::new(id)).await {
                Ok(resp) => resp.result.text.clone(),
                Err(e) => {
                    debug!("coverage: no text for stylesheet {}: {}", url, e);
                    continue;
                }
            };
            entries.push(CoverageEntry {
                url: url.clone(),
                text,
                ranges: merge_ranges(ranges),
            });
        }

        info!("Coverage collected for {} files", entries.len());
        Ok(entries)
    }
}

async fn script_entry(page: &Page, script: &ScriptCoverage) -> Option<CoverageEntry> {
    if script.url.is_empty() {
        return None;
    }
    let source = match page
        .execute(GetScriptSourceParams::new(script.script_id.clone()))
        .await
    {
        Ok(resp) => resp.result.script_source.clone(),
        Err(e) => {
            debug!("coverage: no source for {}: {}", script.url, e);
            return None;
        }
    };

    let nested: Vec<CountedRange> = script
        .functions
        .iter()
        .flat_map(|f| f.ranges.iter())
        .map(|r| CountedRange {
            start: r.start_offset.max(0) as u64,
            end: r.end_offset.max(0) as u64,
            count: r.count.max(0) as u64,
        })
        .collect();

    Some(CoverageEntry {
        url: script.url.clone(),
        text: source,
        ranges: disjoint_used_ranges(&nested),
    })
}
