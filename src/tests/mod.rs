// Host-side scenario tests with simulated modem, storage and clock


mod download_tests;
