//! Request/response observation hooks.

use std::fmt;
use std::sync::Arc;

use crate::request::Request;
use crate::response::Response;

pub type RequestHook = Arc<dyn Fn(&mut Request) + Send + Sync>;
pub type ResponseHook = Arc<dyn Fn(&mut Response) + Send + Sync>;

/// Ordered hook lists, run once per dispatch attempt in registration order.
#[derive(Clone, Default)]
pub struct EventHooks {
    request: Vec<RequestHook>,
    response: Vec<ResponseHook>,
}

impl EventHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` on every request just before it is dispatched.
    pub fn on_request<F>(&mut self, hook: F)
    where
        F: Fn(&mut Request) + Send + Sync + 'static,
    {
        self.request.push(Arc::new(hook));
    }

    /// Run `hook` on every response as soon as its head arrives.
    pub fn on_response<F>(&mut self, hook: F)
    where
        F: Fn(&mut Response) + Send + Sync + 'static,
    {
        self.response.push(Arc::new(hook));
    }

    pub(crate) fn apply_request(&self, request: &mut Request) {
        for hook in &self.request {
            hook(request);
        }
    }

    pub(crate) fn apply_response(&self, response: &mut Response) {
        for hook in &self.response {
            hook(response);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_empty() && self.response.is_empty()
    }
}

impl fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHooks")
            .field("request", &self.request.len())
            .field("response", &self.response.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use std::sync::Mutex;

    #[test]
    fn test_hooks_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = EventHooks::new();
        for name in ["first", "second", "third"] {
            let log = log.clone();
            hooks.on_request(move |req| {
                log.lock().unwrap().push(name);
                req.headers.append("X-Hook", name);
            });
        }

        let mut req = Request::parse(Method::GET, "http://h/").unwrap();
        hooks.apply_request(&mut req);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(req.headers.get_all("x-hook"), vec!["first", "second", "third"]);
    }
}
