use crate::extract::PageInput;

/// Callback invoked with the cleaned page content before the head/body
/// split. Implementations may rewrite the content in place.
pub trait IndexHook: Send + Sync {
    fn on_index(&self, content: &mut String, page: &PageInput);
}

impl<F> IndexHook for F
where
    F: Fn(&mut String, &PageInput) + Send + Sync,
{
    fn on_index(&self, content: &mut String, page: &PageInput) {
        self(content, page)
    }
}

/// Ordered registry of [`IndexHook`]s; callbacks run in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn IndexHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Box<dyn IndexHook>) {
        self.hooks.push(hook);
    }

    pub fn run(&self, content: &mut String, page: &PageInput) {
        for hook in &self.hooks {
            hook.on_index(content, page);
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> PageInput {
        PageInput {
            url: "/".into(),
            pid: 1,
            title: String::new(),
            language: "en".into(),
            protected: false,
            groups: vec![],
            content: String::new(),
            filesize: None,
        }
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let mut registry = HookRegistry::new();
        registry.register(Box::new(|content: &mut String, _: &PageInput| {
            content.push('a');
        }));
        registry.register(Box::new(|content: &mut String, _: &PageInput| {
            content.push('b');
        }));

        let mut content = String::new();
        registry.run(&mut content, &page());
        assert_eq!(content, "ab");
    }
}
