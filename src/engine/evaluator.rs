// ABOUTME: Reply engine that looks up triggers and renders matched templates
// ABOUTME: Executes directives line by line, including nested and deferred invocations

use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::context::InvocationContext;
use super::directives::{
    self, occurrences, splice, strip, CALLBACK, DEFERRED, GLOBAL_GET, GLOBAL_SET, LOCAL_SET,
};
use super::error::{EvalError, Result};
use super::result::Reply;
use super::scheduler::DeferredScheduler;
use crate::registry::{Match, Registry};
use crate::transport::ReplySink;

pub const DEFAULT_MAX_CALLBACK_DEPTH: usize = 16;
pub const DEFAULT_MAX_CALLBACKS: usize = 256;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_callback_depth: usize,
    /// Total callbacks one event may resolve across all nesting levels.
    pub max_callbacks: usize,
    pub max_repeat: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_callback_depth: DEFAULT_MAX_CALLBACK_DEPTH,
            max_callbacks: DEFAULT_MAX_CALLBACKS,
            max_repeat: directives::DEFAULT_MAX_REPEAT,
        }
    }
}

pub struct ReplyEngine {
    registry: Arc<Registry>,
    sink: Arc<dyn ReplySink>,
    scheduler: DeferredScheduler,
    config: EngineConfig,
    this: Weak<ReplyEngine>,
}

impl ReplyEngine {
    pub fn new(registry: Arc<Registry>, sink: Arc<dyn ReplySink>, config: EngineConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            registry,
            sink,
            scheduler: DeferredScheduler::new(),
            config,
            this: this.clone(),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Deferred calls scheduled but not yet finished.
    pub fn pending_deferred(&self) -> usize {
        self.scheduler.pending()
    }

    /// Look up the context's trigger in every word list and render each match.
    ///
    /// Suppressed (blank) renders are dropped, so an empty result means
    /// either no match or nothing to say.
    pub async fn lookup(&self, context: InvocationContext) -> Vec<Reply> {
        self.respond(context).await
    }

    pub async fn lookup_trigger(&self, trigger: &str) -> Vec<Reply> {
        self.respond(InvocationContext::anonymous(trigger)).await
    }

    // Boxed because callbacks recurse back into it.
    fn respond(&self, context: InvocationContext) -> BoxFuture<'_, Vec<Reply>> {
        async move {
            let lookup = self.registry.find(&context.trigger).await;
            if lookup.is_empty() {
                return Vec::new();
            }

            let renders = lookup.matches.iter().map(|found| {
                let render_context = context.for_match(found);
                async move {
                    self.render(found, render_context).await.map(|text| Reply {
                        source: found.source.name().to_string(),
                        text,
                        cost_ms: found.cost.as_secs_f64() * 1000.0,
                        line: found.entry.line,
                    })
                }
            });

            let replies: Vec<Reply> = join_all(renders).await.into_iter().flatten().collect();

            for reply in &replies {
                debug!(
                    "Reply from [{}] line {} ({:.2}ms)",
                    reply.source, reply.line, reply.cost_ms
                );
            }
            info!(
                "Trigger '{}' [{}] ({:?}, depth {}): {} replies, total match cost {:.2}ms",
                context.trigger,
                context.invocation_id,
                context.origin,
                context.depth,
                replies.len(),
                lookup.elapsed.as_secs_f64() * 1000.0
            );

            replies
        }
        .boxed()
    }

    /// Render one matched entry. Returns `None` when the output is blank.
    #[instrument(
        skip(self, found, context),
        fields(invocation = %context.invocation_id, source = %found.source.name(), line = found.entry.line)
    )]
    pub async fn render(&self, found: &Match, mut context: InvocationContext) -> Option<String> {
        let mut output = String::new();

        for line in &found.entry.lines {
            let rendered = self.render_line(line, found, &mut context).await;
            output.push_str(&rendered);
        }

        if output.trim().is_empty() {
            debug!("Suppressing blank reply");
            None
        } else {
            Some(output)
        }
    }

    async fn render_line(
        &self,
        raw: &str,
        found: &Match,
        context: &mut InvocationContext,
    ) -> String {
        if let Some((name, value)) = directives::parse_assignment(raw) {
            context.set_local(name, value);
            return String::new();
        }

        let mut line = raw.to_string();

        let sets = occurrences(&GLOBAL_SET, &line);
        if !sets.is_empty() {
            for set in &sets {
                let value = set.args[1].trim().to_string();
                found
                    .source
                    .set_global(found.generation, set.args[0].clone(), value)
                    .await;
            }
            line = strip(&line, &sets);
        }

        let sets = occurrences(&LOCAL_SET, &line);
        if !sets.is_empty() {
            for set in &sets {
                context.set_local(set.args[0].clone(), set.args[1].trim().to_string());
            }
            line = strip(&line, &sets);
        }

        let gets = occurrences(&GLOBAL_GET, &line);
        if !gets.is_empty() {
            let mut replacements = Vec::new();
            for get in gets {
                if let Some(value) = found.source.global(found.generation, &get.args[0]).await {
                    replacements.push((get.range, value));
                }
            }
            line = splice(&line, replacements);
        }

        line = directives::expand_locals(&line, context.locals());
        line = directives::expand_repeats(&line, self.config.max_repeat);

        let callbacks = occurrences(&CALLBACK, &line);
        if !callbacks.is_empty() {
            let mut replacements = Vec::new();
            for callback in callbacks {
                let trigger = callback.args[0].trim();
                let text = match self.check_callback(context, trigger) {
                    Ok(()) => self.resolve_callback(context, trigger).await,
                    Err(e) => {
                        warn!("{}", e);
                        String::new()
                    }
                };
                replacements.push((callback.range, text));
            }
            line = splice(&line, replacements);
        }

        let calls = occurrences(&DEFERRED, &line);
        if !calls.is_empty() {
            for call in &calls {
                let call = directives::parse_deferred(&call.args[0]);
                self.scheduler
                    .schedule(self.this.clone(), call.delay, context.deferred(&call.trigger));
            }
            line = strip(&line, &calls);
        }

        directives::expand_reserved(&line, context)
    }

    /// Gate a nested lookup: depth, cycles on the current chain, then the event budget.
    fn check_callback(&self, context: &InvocationContext, trigger: &str) -> Result<()> {
        if context.depth >= self.config.max_callback_depth {
            return Err(EvalError::RecursionLimit {
                trigger: trigger.to_string(),
                depth: self.config.max_callback_depth,
            });
        }
        if context.is_cycle(trigger) {
            return Err(EvalError::CallbackCycle {
                trigger: trigger.to_string(),
            });
        }
        if context.spend_callback() > self.config.max_callbacks {
            return Err(EvalError::CallbackBudget {
                trigger: trigger.to_string(),
                budget: self.config.max_callbacks,
            });
        }
        Ok(())
    }

    async fn resolve_callback(&self, context: &InvocationContext, trigger: &str) -> String {
        let replies = self.respond(context.callback(trigger)).await;
        replies
            .into_iter()
            .map(|reply| reply.text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Body of a deferred task: render and push every reply to the sink.
    pub(super) async fn run_deferred(&self, context: InvocationContext) {
        let waited = Utc::now().signed_duration_since(context.received_at);
        debug!(
            "Deferred call '{}' [{}] firing after {}ms",
            context.trigger,
            context.invocation_id,
            waited.num_milliseconds()
        );

        let replies = self.respond(context.clone()).await;

        for reply in &replies {
            if let Err(e) = self.sink.deliver(reply, &context).await {
                warn!(
                    "Failed to deliver deferred reply for '{}' [{}]: {}",
                    context.trigger, context.invocation_id, e
                );
            }
        }
    }

    /// Drain deferred work (aborting whatever outlives `grace`) and shut the registry down.
    pub async fn shutdown(&self, grace: Duration) {
        self.scheduler.shutdown(grace).await;
        self.registry.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Origin;
    use crate::registry::RegistryConfig;
    use crate::transport::{ChannelSink, Delivery};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    async fn engine_with(
        files: &[(&str, &str)],
        config: EngineConfig,
    ) -> (TempDir, Arc<ReplyEngine>, mpsc::UnboundedReceiver<Delivery>) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }

        let registry_config = RegistryConfig::new(dir.path())
            .with_intervals(Duration::from_secs(3600), Duration::from_secs(3600));
        let registry = Registry::open(registry_config).await.unwrap();
        let (sink, receiver) = ChannelSink::new();
        let engine = ReplyEngine::new(registry, Arc::new(sink), config);

        (dir, engine, receiver)
    }

    fn texts(replies: &[Reply]) -> Vec<&str> {
        replies.iter().map(|r| r.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_lines_are_concatenated() {
        let (_dir, engine, _rx) =
            engine_with(&[("a.txt", "hi\nHello\\n\nthere\n")], EngineConfig::default()).await;

        let replies = engine.lookup_trigger("hi").await;
        assert_eq!(texts(&replies), vec!["Hello\nthere"]);
        assert_eq!(replies[0].source, "a.txt");
        assert_eq!(replies[0].line, 1);
        assert!(engine.lookup_trigger("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn test_repeat_directive() {
        let (_dir, engine, _rx) = engine_with(
            &[("a.txt", "r\n$REPEAT x 3$\n\nbad\n$REPEAT x abc$\n")],
            EngineConfig::default(),
        )
        .await;

        assert_eq!(texts(&engine.lookup_trigger("r").await), vec!["xxx"]);
        assert_eq!(
            texts(&engine.lookup_trigger("bad").await),
            vec!["$REPEAT x abc$"]
        );
    }

    #[tokio::test]
    async fn test_local_assignment_and_lookup() {
        let (_dir, engine, _rx) = engine_with(
            &[(
                "a.txt",
                "greet\nname:Ada\nmood = fine\nHi %name%, %mood%$VAR tail !$%tail%\n\nbare\nHi %name%\n",
            )],
            EngineConfig::default(),
        )
        .await;

        assert_eq!(
            texts(&engine.lookup_trigger("greet").await),
            vec!["Hi Ada, fine!"]
        );
        assert_eq!(texts(&engine.lookup_trigger("bare").await), vec!["Hi %name%"]);
    }

    #[tokio::test]
    async fn test_locals_do_not_leak_between_sources() {
        let (_dir, engine, _rx) = engine_with(
            &[("a.txt", "hi\nname=A\n%name%\n"), ("b.txt", "hi\n%name%\n")],
            EngineConfig::default(),
        )
        .await;

        assert_eq!(texts(&engine.lookup_trigger("hi").await), vec!["A", "%name%"]);
    }

    #[tokio::test]
    async fn test_global_store_persists_between_invocations() {
        let (_dir, engine, _rx) = engine_with(
            &[("a.txt", "set\n$GLOBAL g v$stored\n\nget\n[$GLOBAL g$]\n")],
            EngineConfig::default(),
        )
        .await;

        assert_eq!(texts(&engine.lookup_trigger("get").await), vec!["[$GLOBAL g$]"]);
        assert_eq!(texts(&engine.lookup_trigger("set").await), vec!["stored"]);
        assert_eq!(texts(&engine.lookup_trigger("get").await), vec!["[v]"]);
    }

    #[tokio::test]
    async fn test_callback_inlines_nested_reply() {
        let (_dir, engine, _rx) = engine_with(
            &[("a.txt", "outer\nA$CALLBACK inner$B$CALLBACK missing$C\n\ninner\nmid\n")],
            EngineConfig::default(),
        )
        .await;

        assert_eq!(texts(&engine.lookup_trigger("outer").await), vec!["AmidBC"]);
    }

    #[tokio::test]
    async fn test_self_callback_fails_closed() {
        let (_dir, engine, _rx) =
            engine_with(&[("a.txt", "loop\nx$CALLBACK loop$\n")], EngineConfig::default()).await;

        assert_eq!(texts(&engine.lookup_trigger("loop").await), vec!["x"]);
    }

    #[tokio::test]
    async fn test_callback_chain_stops_at_depth_limit() {
        let config = EngineConfig {
            max_callback_depth: 2,
            ..EngineConfig::default()
        };
        let chain = "l0\n0$CALLBACK l1$\n\nl1\n1$CALLBACK l2$\n\nl2\n2$CALLBACK l3$\n\nl3\n3\n";
        let (_dir, engine, _rx) = engine_with(&[("a.txt", chain)], config).await;

        assert_eq!(texts(&engine.lookup_trigger("l0").await), vec!["012"]);
    }

    #[tokio::test]
    async fn test_fan_out_cycle_returns_promptly() {
        let (_dir, engine, _rx) = engine_with(
            &[("boom.txt", "b\n$CALLBACK b$$CALLBACK b$$CALLBACK b$\n")],
            EngineConfig::default(),
        )
        .await;

        let replies = tokio::time::timeout(Duration::from_secs(5), engine.lookup_trigger("b"))
            .await
            .expect("self-referencing callbacks must not block the lookup");
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_callback_budget_caps_fan_out() {
        let config = EngineConfig {
            max_callbacks: 2,
            ..EngineConfig::default()
        };
        let (_dir, engine, _rx) = engine_with(
            &[("a.txt", "a\n[$CALLBACK b$$CALLBACK b$$CALLBACK b$]\n\nb\ny\n")],
            config,
        )
        .await;

        assert_eq!(texts(&engine.lookup_trigger("a").await), vec!["[yy]"]);
        // The budget is per event, so the next lookup starts from zero.
        assert_eq!(texts(&engine.lookup_trigger("a").await), vec!["[yy]"]);
    }

    #[tokio::test]
    async fn test_blank_render_is_suppressed() {
        let (_dir, engine, _rx) = engine_with(
            &[("a.txt", "quiet\n$VAR a b$\n%Space%\n")],
            EngineConfig::default(),
        )
        .await;

        assert!(engine.lookup_trigger("quiet").await.is_empty());
    }

    #[tokio::test]
    async fn test_reserved_substitutions() {
        let (_dir, engine, _rx) = engine_with(
            &[("a.txt", "\nwhere\n%Source%:%Line%%Space%by %Sender% in %Group%\n")],
            EngineConfig::default(),
        )
        .await;

        let context = InvocationContext::new("where", "u1", "g1");
        assert_eq!(texts(&engine.lookup(context).await), vec!["a.txt:2 by u1 in g1"]);
    }

    #[tokio::test]
    async fn test_deferred_call_is_delivered_to_sink() {
        let (_dir, engine, mut rx) = engine_with(
            &[("a.txt", "ping\npong\n\nstart\nnow$CALL 0.05 ping$\n")],
            EngineConfig::default(),
        )
        .await;

        let context = InvocationContext::new("start", "u1", "g1");
        assert_eq!(texts(&engine.lookup(context).await), vec!["now"]);

        let delivery = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.reply.text, "pong");
        assert_eq!(delivery.context.origin, Origin::Deferred);
        assert_eq!(delivery.context.trigger, "ping");
        assert_eq!(delivery.context.sender_id, "u1");
    }

    #[tokio::test]
    async fn test_shutdown_aborts_pending_deferred_calls() {
        let (_dir, engine, mut rx) = engine_with(
            &[("a.txt", "ping\npong\n\nlater\nok$CALL 60 ping$\n")],
            EngineConfig::default(),
        )
        .await;

        assert_eq!(texts(&engine.lookup_trigger("later").await), vec!["ok"]);
        assert_eq!(engine.pending_deferred(), 1);

        engine.shutdown(Duration::from_millis(20)).await;
        assert_eq!(engine.pending_deferred(), 0);
        assert!(engine.registry().is_shut_down());
        assert!(rx.try_recv().is_err());
    }
}
