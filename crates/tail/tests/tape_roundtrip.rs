//! CSV round-trip over generated tapes.

use paysim_tail::{generate_tape, read_tape, write_tape, ClientOptions, PrepareOptions};

#[test]
fn generated_tapes_round_trip_through_csv() {
    for seed in [0u64, 1, 42, 0xDEAD_BEEF] {
        let tape = generate_tape(
            &PrepareOptions {
                number_of_clients: 12,
                duration: 50,
                client_options: ClientOptions {
                    online_likelihood: 0.7,
                    submit_likelihood: 0.5,
                },
            },
            seed,
        );
        let mut buf = Vec::new();
        write_tape(&mut buf, &tape).unwrap();
        let parsed = read_tape(buf.as_slice()).unwrap();
        assert_eq!(parsed, tape, "seed {seed}");
    }
}
