#[cfg(test)]
mod permissions_tests {
    use camera_controller::permissions::{check_permission, check_permission_detailed};

    #[test]
    fn test_check_permission_is_consistent() {
        let first = check_permission();
        for _ in 0..5 {
            assert_eq!(check_permission(), first, "Permission status should be consistent");
        }
    }

    #[test]
    fn test_check_permission_concurrent() {
        let handles: Vec<_> = (0..10)
            .map(|_| std::thread::spawn(check_permission))
            .collect();

        for handle in handles {
            let _status = handle.join().unwrap();
        }
    }

    #[test]
    fn test_detailed_permission_has_message() {
        let info = check_permission_detailed();
        assert!(!info.message.is_empty());
        assert_eq!(info.status, check_permission());
    }
}
