/// Repaint request flag raised by the streaming layer whenever a tile lands
/// or errors; the render loop drains it once per frame.
#[derive(Debug, Default)]
pub struct RepaintFlag {
    pending: bool,
}

impl RepaintFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self) {
        self.pending = true;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::RepaintFlag;

    #[test]
    fn request_then_take() {
        let mut flag = RepaintFlag::new();
        assert!(!flag.is_pending());
        flag.request();
        flag.request();
        assert!(flag.take());
        assert!(!flag.take());
    }
}
